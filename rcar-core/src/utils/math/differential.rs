//! Per-side drive scaling derived from turning radii.
//!
//! Without a mechanical differential the inner wheel is throttled in
//! proportion to how much tighter its circle is than the outer wheel's.

use crate::utils::math::steering::STRAIGHT;

/// Speed scale for each side, each in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialScale {
    pub left: f64,
    pub right: f64,
}

impl DifferentialScale {
    pub const NEUTRAL: DifferentialScale = DifferentialScale {
        left: 1.0,
        right: 1.0,
    };
}

impl Default for DifferentialScale {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Scale the side with the smaller radius by `min / max`; the outer side keeps 1.
///
/// Straight driving (either radius is the straight sentinel) and equal
/// radii both give no differential.
pub fn allocate(
    left_radius: f64,
    right_radius: f64,
) -> DifferentialScale {
    if left_radius == STRAIGHT || right_radius == STRAIGHT || left_radius == right_radius {
        return DifferentialScale::NEUTRAL;
    }
    if left_radius <= 0.0 || right_radius <= 0.0 {
        tracing::warn!(left_radius, right_radius, "unexpected turning radius, no differential");
        return DifferentialScale::NEUTRAL;
    }

    let ratio = left_radius.min(right_radius) / left_radius.max(right_radius);
    if left_radius < right_radius {
        DifferentialScale {
            left: ratio,
            right: 1.0,
        }
    } else {
        DifferentialScale {
            left: 1.0,
            right: ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_has_no_differential() {
        assert_eq!(allocate(STRAIGHT, STRAIGHT), DifferentialScale::NEUTRAL);
        assert_eq!(allocate(STRAIGHT, 400.0), DifferentialScale::NEUTRAL);
        assert_eq!(allocate(400.0, STRAIGHT), DifferentialScale::NEUTRAL);
    }

    #[test]
    fn equal_radii_have_no_differential() {
        assert_eq!(allocate(500.0, 500.0), DifferentialScale::NEUTRAL);
    }

    #[test]
    fn inner_left_wheel_is_throttled() {
        let s = allocate(300.0, 400.0);
        assert!((s.left - 0.75).abs() < 1e-12);
        assert_eq!(s.right, 1.0);
    }

    #[test]
    fn inner_right_wheel_is_throttled() {
        let s = allocate(400.0, 100.0);
        assert_eq!(s.left, 1.0);
        assert!((s.right - 0.25).abs() < 1e-12);
    }

    #[test]
    fn scales_stay_in_unit_interval() {
        for (l, r) in [(1.0, 1e6), (1e6, 1.0), (387.3, 497.6)] {
            let s = allocate(l, r);
            assert!(s.left > 0.0 && s.left <= 1.0);
            assert!(s.right > 0.0 && s.right <= 1.0);
        }
    }
}
