//! Utility re-exports for the RC car control pipeline.
//!
//! - `config`: vehicle geometry, calibration and channel assignments
//! - `controllers`: actuators, PWM dispatch queue, input bindings and the
//!   `VehicleController` that ties them together
//! - `error`: error taxonomy shared by every layer
//! - `math`: range mapping, steering geometry and differential allocation
//! - `retry`: bounded retry wrapper for fallible bus writes

pub mod config;
pub mod controllers;
pub mod error;
pub mod math;
pub mod retry;

pub use config::CarConfig;
pub use controllers::VehicleController;
pub use math::steering::SteeringSolver as ss;
