//! Controllers for the RC car.
//!
//! - `actuators`: servo and drive actuators producing pulse values
//! - `dispatch`: the single-worker PWM dispatch queue
//! - `input`: joystick decoding, input bindings and scripted commands
//! - `pwm`: the `PwmBus` abstraction and its PCA9685 binding
//!
//! `VehicleController` receives one input event at a time, resolves it
//! through the steering solver and differential allocator, and drives the
//! actuators, which stage their pulses in the dispatch queue.

pub mod actuators;
pub mod dispatch;
pub mod input;
pub mod pwm;

pub use actuators::{DriveActuator, LightActuator, MotorState, ServoActuator};
pub use dispatch::{DispatchStats, PwmDispatchQueue, PwmSender};
pub use input::{ControlCommand, ControlSurface, InputBindings};
pub use pwm::PwmBus;

use crate::utils::{
    config::CarConfig,
    error::{ConfigError, GeometryError},
    math::{
        differential::{self, DifferentialScale},
        range::map_range,
        steering::{SteeringResult, SteeringSolver},
    },
};

/// Servo angle that points the wheels (or camera) straight ahead.
pub const CENTER_ANGLE: f64 = 90.0;

/// How far the light hat must be pushed, as a fraction of its half range.
const LIGHT_THRESHOLD: f64 = 0.5;

/// Per-event orchestration of steering, throttle and braking.
///
/// Handlers take `&mut self`; events from several threads must be
/// serialized by the caller, e.g. by wrapping the controller in a mutex.
pub struct VehicleController<B>
where
    B: PwmBus + Send + 'static,
{
    solver: SteeringSolver,
    max_steering_angle: f64,
    left_servo: ServoActuator<PwmSender>,
    right_servo: ServoActuator<PwmSender>,
    camera_servo: Option<ServoActuator<PwmSender>>,
    left_drive: DriveActuator<PwmSender>,
    right_drive: DriveActuator<PwmSender>,
    light: Option<LightActuator<PwmSender>>,
    last_steering: Option<SteeringResult>,
    differential: DifferentialScale,
    queue: PwmDispatchQueue<B>,
}

impl<B> VehicleController<B>
where
    B: PwmBus + Send + 'static,
{
    /// Validate `config`, start the dispatch queue over `bus` and build the
    /// actuators on top of it.
    pub fn new(
        bus: B,
        config: &CarConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let solver = SteeringSolver::new(config.geometry)?;
        let queue = PwmDispatchQueue::start(bus, config.pwm.channels, config.retry.dispatch)?;

        let direct = config.retry.direct;
        let left_servo = ServoActuator::new(queue.sender(), config.servos.left, direct)?;
        let right_servo = ServoActuator::new(queue.sender(), config.servos.right, direct)?;
        let camera_servo = config
            .servos
            .camera
            .map(|cal| ServoActuator::new(queue.sender(), cal, direct))
            .transpose()?;
        let left_drive = DriveActuator::new(queue.sender(), config.drives.left, direct);
        let right_drive = DriveActuator::new(queue.sender(), config.drives.right, direct);
        let light = config
            .light
            .map(|light| LightActuator::new(queue.sender(), light.channel, direct));

        tracing::info!(
            max_steering_angle = config.steering.max_angle_deg,
            camera = camera_servo.is_some(),
            light = light.is_some(),
            "vehicle controller ready"
        );

        Ok(Self {
            solver,
            max_steering_angle: config.steering.max_angle_deg,
            left_servo,
            right_servo,
            camera_servo,
            left_drive,
            right_drive,
            light,
            last_steering: None,
            differential: DifferentialScale::NEUTRAL,
            queue,
        })
    }

    /// Steer to body angle `angle` (degrees, negative = left).
    ///
    /// The configured steering limit bounds the range `on_steering` maps
    /// stick input onto; it is not applied here, so any angle the linkage
    /// can reach is accepted.
    ///
    /// If the linkage cannot reach the angle the servos hold their previous
    /// position and the error is returned for logging.
    pub fn steer(
        &mut self,
        angle: f64,
    ) -> Result<SteeringResult, GeometryError> {
        let result = self.solver.solve(angle)?;
        let scale = differential::allocate(result.left_radius, result.right_radius);

        self.left_servo.set_angle(CENTER_ANGLE + result.left_servo_angle);
        self.right_servo.set_angle(CENTER_ANGLE + result.right_servo_angle);
        self.left_drive.set_differential(scale.left);
        self.right_drive.set_differential(scale.right);
        if scale != self.differential {
            self.left_drive.recompute();
            self.right_drive.recompute();
        }

        self.last_steering = Some(result);
        self.differential = scale;
        Ok(result)
    }

    /// Latest successful steering solve.
    pub fn last_steering(&self) -> Option<&SteeringResult> {
        self.last_steering.as_ref()
    }

    /// Differential scale currently applied to the drives.
    pub fn differential(&self) -> DifferentialScale {
        self.differential
    }

    /// Pulses last handed to the left and right steering servos.
    pub fn steering_pulses(&self) -> (Option<u16>, Option<u16>) {
        (self.left_servo.last_pulse(), self.right_servo.last_pulse())
    }

    pub fn left_drive(&self) -> &MotorState {
        self.left_drive.state()
    }

    pub fn right_drive(&self) -> &MotorState {
        self.right_drive.state()
    }

    /// Whether the light is on; `None` without a light channel.
    pub fn light_on(&self) -> Option<bool> {
        self.light.as_ref().map(LightActuator::is_on)
    }

    pub fn stats(&self) -> DispatchStats {
        self.queue.stats()
    }

    /// Apply a scripted command.
    pub fn apply(
        &mut self,
        command: ControlCommand,
    ) {
        tracing::debug!(?command, "control command");
        command.apply(self);
    }

    /// Put every actuator into its neutral state: servos centred, brake
    /// released, drives stopped, differential released, light off.
    fn neutral(&mut self) {
        // always re-send the centre; the servos may have lost power meanwhile
        let servos = [
            Some(&mut self.left_servo),
            Some(&mut self.right_servo),
            self.camera_servo.as_mut(),
        ];
        for servo in servos.into_iter().flatten() {
            servo.invalidate();
            servo.set_angle(CENTER_ANGLE);
        }
        // a button held while the pad dropped never sends its release
        for drive in [&mut self.left_drive, &mut self.right_drive] {
            drive.set_differential(1.0);
            drive.brake(false);
            drive.stop();
        }
        if let Some(light) = self.light.as_mut() {
            light.switch(false);
        }
        self.last_steering = None;
        self.differential = DifferentialScale::NEUTRAL;
    }

    /// Return to neutral and stop the dispatch worker, flushing what is staged.
    ///
    /// Hands back the bus, or `None` if the worker panicked.
    pub fn close(mut self) -> Option<B> {
        tracing::info!("closing vehicle controller");
        self.neutral();
        self.queue.stop()
    }
}

impl<B> ControlSurface for VehicleController<B>
where
    B: PwmBus + Send + 'static,
{
    fn on_steering(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    ) {
        let limit = self.max_steering_angle;
        let angle = match map_range(value, min, max, -limit, limit) {
            Ok(angle) => angle,
            Err(error) => {
                tracing::error!(%error, "steering input ignored");
                return;
            }
        };
        if let Err(error) = self.steer(angle) {
            tracing::warn!(%error, angle, "steering held at previous position");
        }
    }

    fn on_forward(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    ) {
        let left = self.left_drive.forward(value, min, max);
        let right = self.right_drive.forward(value, min, max);
        if let Err(error) = left.and(right) {
            tracing::error!(%error, "forward input ignored");
        }
    }

    fn on_reverse(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    ) {
        let left = self.left_drive.reverse(value, min, max);
        let right = self.right_drive.reverse(value, min, max);
        if let Err(error) = left.and(right) {
            tracing::error!(%error, "reverse input ignored");
        }
    }

    fn on_camera_rotate(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    ) {
        let Some(camera) = self.camera_servo.as_mut() else {
            tracing::trace!("no camera servo configured");
            return;
        };
        match map_range(value, min, max, 0.0, 180.0) {
            Ok(angle) => {
                camera.set_angle(angle);
            }
            Err(error) => tracing::error!(%error, "camera input ignored"),
        }
    }

    fn on_light(
        &mut self,
        value: f64,
        min: f64,
        max: f64,
    ) {
        let Some(light) = self.light.as_mut() else {
            tracing::trace!("no light configured");
            return;
        };
        match map_range(value, min, max, -1.0, 1.0) {
            Ok(pos) if pos <= -LIGHT_THRESHOLD => {
                light.switch(true);
            }
            Ok(pos) if pos >= LIGHT_THRESHOLD => {
                light.switch(false);
            }
            Ok(_) => {}
            Err(error) => tracing::error!(%error, "light input ignored"),
        }
    }

    fn on_brake(
        &mut self,
        pressed: bool,
    ) {
        tracing::debug!(pressed, "brake");
        self.left_drive.brake(pressed);
        self.right_drive.brake(pressed);
    }

    fn on_connected(&mut self) {
        tracing::info!("gamepad connected");
        self.neutral();
    }

    fn on_disconnected(&mut self) {
        tracing::info!("gamepad disconnected");
        self.neutral();
    }
}
