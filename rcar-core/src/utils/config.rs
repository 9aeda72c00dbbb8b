//! Car configuration: geometry, servo calibration and channel assignments.
//!
//! Loaded from JSON; any section left out falls back to the values of the
//! stock car. `validate` runs before a controller is built so degenerate
//! values are rejected up front instead of producing NaN while driving.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::utils::{error::ConfigError, retry::RetryPolicy};

/// Highest pulse value the 12-bit PWM controller accepts.
pub const MAX_PULSE: u16 = 4095;

/// Number of outputs on a PCA9685.
pub const PCA9685_CHANNELS: usize = 16;

/// Chassis and steering linkage dimensions (same length unit throughout).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleGeometry {
    /// Wheel mount to servo rotor, along the body.
    pub mount_height: f64,
    /// Wheel mount to servo rotor, across the body.
    pub mount_width: f64,
    pub wheel_arm: f64,
    pub servo_horn: f64,
    /// Link between wheel arm and servo horn.
    pub bridge: f64,
    /// Distance between the left and right wheels.
    pub track_width: f64,
    /// Distance between the front and rear axles.
    pub wheelbase: f64,
}

impl Default for VehicleGeometry {
    fn default() -> Self {
        Self {
            mount_height: 46.1,
            mount_width: 40.0,
            wheel_arm: 26.1,
            servo_horn: 20.0,
            bridge: 40.0,
            track_width: 123.0,
            wheelbase: 193.65,
        }
    }
}

impl VehicleGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dims = [
            ("mount_height", self.mount_height),
            ("mount_width", self.mount_width),
            ("wheel_arm", self.wheel_arm),
            ("servo_horn", self.servo_horn),
            ("bridge", self.bridge),
            ("track_width", self.track_width),
            ("wheelbase", self.wheelbase),
        ];
        for (name, value) in dims {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveDimension { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Body steering angle at full stick deflection (degrees).
    pub max_angle_deg: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self { max_angle_deg: 40.0 }
    }
}

/// Pulse range of one servo, measured once per physical servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoCalibration {
    pub channel: u8,
    /// Pulse at 0 degrees.
    pub pulse_min: u16,
    /// Pulse at 180 degrees.
    pub pulse_max: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoSet {
    pub left: ServoCalibration,
    pub right: ServoCalibration,
    pub camera: Option<ServoCalibration>,
}

impl Default for ServoSet {
    fn default() -> Self {
        Self {
            left: ServoCalibration {
                channel: 0,
                pulse_min: 225,
                pulse_max: 475,
            },
            right: ServoCalibration {
                channel: 1,
                pulse_min: 225,
                pulse_max: 475,
            },
            camera: Some(ServoCalibration {
                channel: 2,
                pulse_min: 150,
                pulse_max: 600,
            }),
        }
    }
}

/// The two H-bridge inputs of one drive motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveChannels {
    pub forward: u8,
    pub reverse: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSet {
    pub left: DriveChannels,
    pub right: DriveChannels,
}

impl Default for DriveSet {
    fn default() -> Self {
        Self {
            left: DriveChannels {
                forward: 4,
                reverse: 5,
            },
            right: DriveChannels {
                forward: 6,
                reverse: 7,
            },
        }
    }
}

/// Car light, switched fully on or off through one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightChannel {
    pub channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    pub channels: usize,
    /// PCA9685 prescale register value; 100 gives roughly 60 Hz.
    pub prescale: u8,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            channels: PCA9685_CHANNELS,
            prescale: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Used by actuators that write to the bus themselves. Inside a
    /// `VehicleController` every actuator stages into the dispatch queue,
    /// which cannot fail, so this policy never triggers there.
    pub direct: RetryPolicy,
    /// Used by the dispatch worker for each drained write.
    pub dispatch: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            direct: RetryPolicy::DIRECT,
            dispatch: RetryPolicy::DISPATCH,
        }
    }
}

/// Everything needed to build a `VehicleController`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarConfig {
    pub geometry: VehicleGeometry,
    pub steering: SteeringConfig,
    pub servos: ServoSet,
    pub drives: DriveSet,
    pub light: Option<LightChannel>,
    pub pwm: PwmConfig,
    pub retry: RetryConfig,
}

impl Default for CarConfig {
    fn default() -> Self {
        Self {
            geometry: VehicleGeometry::default(),
            steering: SteeringConfig::default(),
            servos: ServoSet::default(),
            drives: DriveSet::default(),
            light: Some(LightChannel { channel: 8 }),
            pwm: PwmConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl CarConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject any configuration that would make the pipeline produce
    /// undefined output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry.validate()?;

        let limit = self.steering.max_angle_deg;
        if !(limit > 0.0 && limit < 90.0) {
            return Err(ConfigError::SteeringLimit(limit));
        }

        let channels = self.pwm.channels;
        if channels == 0 || channels > PCA9685_CHANNELS {
            return Err(ConfigError::ChannelCount(channels));
        }

        let mut servos = vec![self.servos.left, self.servos.right];
        servos.extend(self.servos.camera);
        for servo in &servos {
            for pulse in [servo.pulse_min, servo.pulse_max] {
                if pulse > MAX_PULSE {
                    return Err(ConfigError::PulseOutOfRange(pulse));
                }
            }
            if servo.pulse_min == servo.pulse_max {
                return Err(ConfigError::DegenerateRange(servo.pulse_min as f64));
            }
        }

        let mut used: Vec<u8> = servos.iter().map(|s| s.channel).collect();
        for drive in [self.drives.left, self.drives.right] {
            used.push(drive.forward);
            used.push(drive.reverse);
        }
        used.extend(self.light.map(|light| light.channel));
        for (i, &channel) in used.iter().enumerate() {
            if channel as usize >= channels {
                return Err(ConfigError::ChannelOutOfRange { channel, channels });
            }
            if used[..i].contains(&channel) {
                return Err(ConfigError::DuplicateChannel(channel));
            }
        }

        self.retry.direct.validate()?;
        self.retry.dispatch.validate()
    }
}
