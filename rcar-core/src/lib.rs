//! Core drivers and utilities for an Ackermann-steered four-wheel RC car.
//!
//! Steering geometry, differential speed allocation, servo/drive actuators
//! and the PWM dispatch queue that serializes all bus writes onto one worker.
//!
//! For a runnable host program, see `rcar-app/mock-car`.

pub mod utils;
