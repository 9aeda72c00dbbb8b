//! Error types shared across the control pipeline.
//!
//! Configuration problems fail fast at construction time, geometry problems
//! are recoverable per steering event, and bus errors never travel further
//! than the retry wrapper that observed them.

use thiserror::Error;

/// Degenerate mapping parameters or invalid vehicle configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("degenerate input range: in_min == in_max == {0}")]
    DegenerateRange(f64),

    #[error("{name} must be a positive finite number, got {value}")]
    NonPositiveDimension { name: &'static str, value: f64 },

    #[error("channel {channel} out of range (bus has {channels} channels)")]
    ChannelOutOfRange { channel: u8, channels: usize },

    #[error("channel count {0} must be between 1 and the bus size")]
    ChannelCount(usize),

    #[error("pulse {0} exceeds 4095")]
    PulseOutOfRange(u16),

    #[error("steering limit must be within (0, 90) degrees, got {0}")]
    SteeringLimit(f64),

    #[error("channel {0} assigned to more than one actuator")]
    DuplicateChannel(u8),

    #[error("retry attempts must be at least 1")]
    ZeroAttempts,

    #[error("invalid configuration file: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

/// The four-bar linkage cannot reach the requested road-wheel angle.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("linkage cannot reach road-wheel angle {road_angle:.3} deg")]
    Infeasible { road_angle: f64 },

    #[error("non-finite steering result for angle {0} deg")]
    NonFinite(f64),
}

/// Errors raised while writing a pulse onto the physical bus.
#[derive(Debug, Error)]
pub enum BusError<E: core::fmt::Debug> {
    #[error("PWM driver error: {0:?}")]
    Pwm(pwm_pca9685::Error<E>),

    #[error("channel {0} does not exist on this bus")]
    InvalidChannel(u8),
}

/// Malformed joystick event data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("short joystick event: {0} of 8 bytes")]
    ShortRead(usize),

    #[error("unknown joystick event type 0x{0:02X}")]
    UnknownType(u8),
}
