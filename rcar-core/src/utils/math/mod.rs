//! Math utilities for the RC car.
//!
//! Range mapping, Ackermann steering geometry and the differential speed
//! allocator built on top of it.

pub mod differential;
pub mod range;
pub mod steering;
