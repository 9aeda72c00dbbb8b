//! Linear range mapping.
//!
//! Every actuator and input handler translates values between ranges with
//! this. Values are never clamped, so extrapolating outside the input range
//! is allowed; callers feed in-range values where clamping matters.

use crate::utils::error::ConfigError;

/// Map `x` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Fails with `ConfigError::DegenerateRange` when `in_min == in_max`.
pub fn map_range(
    x: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
) -> Result<f64, ConfigError> {
    Ok(RangeMap::new((in_min, in_max), (out_min, out_max))?.apply(x))
}

/// A validated linear mapping between two ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMap {
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
}

impl RangeMap {
    pub fn new(
        input: (f64, f64),
        output: (f64, f64),
    ) -> Result<Self, ConfigError> {
        let (in_min, in_max) = input;
        if in_min == in_max || !(in_max - in_min).is_finite() {
            return Err(ConfigError::DegenerateRange(in_min));
        }
        let (out_min, out_max) = output;
        Ok(Self {
            in_min,
            in_max,
            out_min,
            out_max,
        })
    }

    /// Interpolate `x`. The range endpoints map exactly onto the output
    /// endpoints.
    pub fn apply(
        &self,
        x: f64,
    ) -> f64 {
        let t = (x - self.in_min) / (self.in_max - self.in_min);
        self.out_min * (1.0 - t) + self.out_max * t
    }

    /// The mapping in the opposite direction.
    pub fn inverse(&self) -> Result<Self, ConfigError> {
        Self::new((self.out_min, self.out_max), (self.in_min, self.in_max))
    }
}
