//! Ackermann steering geometry for a car with independently servoed front wheels.
//!
//! `SteeringSolver` turns one signed body steering angle into the two
//! road-wheel angles and turning radii, then inverts the four-bar linkage
//! between each servo horn and its wheel arm to find the servo angles.
//!
//! Sign convention: negative angles turn left, positive angles turn right.
//!
//! # Example
//! ```rust
//! use rcar_core::utils::{config::VehicleGeometry, math::steering::SteeringSolver};
//! let solver = SteeringSolver::new(VehicleGeometry::default()).unwrap();
//! let result = solver.solve(30.0).unwrap();
//! assert!(result.left_radius > result.right_radius);
//! ```

use crate::utils::{
    config::VehicleGeometry,
    error::{ConfigError, GeometryError},
};

/// Radius reported when driving straight; no turn centre exists.
pub const STRAIGHT: f64 = -1.0;

const DEG: f64 = core::f64::consts::PI / 180.0;

/// Road-wheel angles (degrees) and turning radii for one steering input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadWheels {
    pub left_angle: f64,
    pub right_angle: f64,
    pub left_radius: f64,
    pub right_radius: f64,
}

/// Servo angles (degrees, 0 = wheels straight) and turning radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringResult {
    pub left_servo_angle: f64,
    pub right_servo_angle: f64,
    pub left_radius: f64,
    pub right_radius: f64,
}

impl SteeringResult {
    pub fn is_straight(&self) -> bool {
        self.left_radius == STRAIGHT || self.right_radius == STRAIGHT
    }
}

/// Stateless solver over a validated vehicle geometry.
#[derive(Debug, Clone, Copy)]
pub struct SteeringSolver {
    geometry: VehicleGeometry,
}

impl SteeringSolver {
    /// Build a solver, rejecting non-positive dimensions.
    pub fn new(geometry: VehicleGeometry) -> Result<Self, ConfigError> {
        geometry.validate()?;
        Ok(Self { geometry })
    }

    pub fn geometry(&self) -> &VehicleGeometry {
        &self.geometry
    }

    /// Road-wheel angles and radii for body steering angle `angle` (degrees).
    ///
    /// The inner wheel takes the commanded angle; the outer wheel is turned
    /// less so both trace circles around the same centre.
    pub fn wheel_angles(
        &self,
        angle: f64,
    ) -> RoadWheels {
        let w = self.geometry.track_width;
        let l = self.geometry.wheelbase;

        if angle == 0.0 {
            return RoadWheels {
                left_angle: 0.0,
                right_angle: 0.0,
                left_radius: STRAIGHT,
                right_radius: STRAIGHT,
            };
        }

        // distance from the inner wheel to the turn centre along the rear axle
        let inner = l * libm::tan((90.0 - angle.abs()) * DEG);
        let outer = w + inner;
        let outer_angle = libm::atan(l / outer) / DEG;
        let inner_radius = libm::hypot(l, inner);
        let outer_radius = libm::hypot(l, outer);

        if angle < 0.0 {
            RoadWheels {
                left_angle: angle,
                right_angle: -outer_angle,
                left_radius: inner_radius,
                right_radius: outer_radius,
            }
        } else {
            RoadWheels {
                left_angle: outer_angle,
                right_angle: angle,
                left_radius: outer_radius,
                right_radius: inner_radius,
            }
        }
    }

    /// Servo horn angle (degrees) that puts the wheel arm at `road_angle`.
    ///
    /// Solves the two triangles of the linkage with the law of cosines.
    /// Fails when the linkage cannot physically reach the angle.
    pub fn servo_angle(
        &self,
        road_angle: f64,
    ) -> Result<f64, GeometryError> {
        let g = &self.geometry;
        let phi = road_angle * DEG;
        let d1 = g.wheel_arm * libm::sin(phi);
        let d2 = g.wheel_arm * libm::cos(phi);
        let u = g.mount_height - d2;
        let o = g.mount_width + d1;
        let e = libm::hypot(u, o);

        let horn = g.servo_horn;
        let bridge = g.bridge;
        let x1 = acos_checked(
            (e * e + horn * horn - bridge * bridge) / (2.0 * e * horn),
            road_angle,
        )?;
        let x2 = acos_checked((e * e + o * o - u * u) / (2.0 * o * e), road_angle)?;

        Ok(90.0 - (x1 + x2) / DEG)
    }

    /// Full solve: servo angles for both wheels plus both turning radii.
    ///
    /// The right servo is mounted mirrored, so its road angle is negated
    /// going in and the servo angle negated coming out.
    pub fn solve(
        &self,
        angle: f64,
    ) -> Result<SteeringResult, GeometryError> {
        if !angle.is_finite() {
            return Err(GeometryError::NonFinite(angle));
        }
        let wheels = self.wheel_angles(angle);
        if angle == 0.0 {
            return Ok(SteeringResult {
                left_servo_angle: 0.0,
                right_servo_angle: 0.0,
                left_radius: wheels.left_radius,
                right_radius: wheels.right_radius,
            });
        }

        let left_servo_angle = self.servo_angle(wheels.left_angle)?;
        let right_servo_angle = -self.servo_angle(-wheels.right_angle)?;
        let result = SteeringResult {
            left_servo_angle,
            right_servo_angle,
            left_radius: wheels.left_radius,
            right_radius: wheels.right_radius,
        };

        let finite = [
            result.left_servo_angle,
            result.right_servo_angle,
            result.left_radius,
            result.right_radius,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(GeometryError::NonFinite(angle));
        }
        Ok(result)
    }
}

/// `acos` in radians, rejecting arguments outside [-1, 1] instead of returning NaN.
fn acos_checked(
    x: f64,
    road_angle: f64,
) -> Result<f64, GeometryError> {
    if !(-1.0..=1.0).contains(&x) {
        return Err(GeometryError::Infeasible { road_angle });
    }
    Ok(libm::acos(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> SteeringSolver {
        SteeringSolver::new(VehicleGeometry::default()).unwrap()
    }

    fn close(
        a: f64,
        b: f64,
    ) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn straight_is_neutral() {
        let r = solver().solve(0.0).unwrap();
        assert_eq!(r.left_servo_angle, 0.0);
        assert_eq!(r.right_servo_angle, 0.0);
        assert_eq!(r.left_radius, STRAIGHT);
        assert_eq!(r.right_radius, STRAIGHT);
        assert!(r.is_straight());
    }

    #[test]
    fn linkage_neutral_is_zero() {
        // the default linkage is built so a straight wheel means a centred horn
        assert!(solver().servo_angle(0.0).unwrap().abs() < 1e-9);
    }

    #[test]
    fn right_turn_reference_values() {
        let s = solver();
        let wheels = s.wheel_angles(30.0);
        assert!(close(wheels.left_angle, 22.900990868372640));
        assert!(close(wheels.right_angle, 30.0));
        assert!(close(wheels.left_radius, 497.6359645020498));
        assert!(close(wheels.right_radius, 387.3));

        let r = s.solve(30.0).unwrap();
        assert!(close(r.left_servo_angle, 31.576038380076106));
        assert!(close(r.right_servo_angle, 37.941625584009856));
        assert!(r.left_radius > r.right_radius);
    }

    #[test]
    fn inner_wheel_turns_tighter() {
        let s = solver();
        for angle in [5.0, 15.0, 25.0, 40.0] {
            let w = s.wheel_angles(angle);
            assert!(w.right_angle > w.left_angle);
            assert!(w.right_radius < w.left_radius);
        }
    }

    #[test]
    fn mirror_symmetry() {
        let s = solver();
        for angle in [1.0, 10.0, 20.0, 30.0, 45.0] {
            let pos = s.solve(angle).unwrap();
            let neg = s.solve(-angle).unwrap();
            assert!(close(neg.left_servo_angle, -pos.right_servo_angle), "angle {}", angle);
            assert!(close(neg.right_servo_angle, -pos.left_servo_angle), "angle {}", angle);
            assert!(close(neg.left_radius, pos.right_radius));
            assert!(close(neg.right_radius, pos.left_radius));
        }
    }

    #[test]
    fn left_turn_reference_values() {
        let r = solver().solve(-10.0).unwrap();
        assert!(close(r.left_servo_angle, -13.066879157786062));
        assert!(close(r.right_servo_angle, -11.813409669200752));
        assert!(close(r.left_radius, 1115.1859040607642));
        assert!(close(r.right_radius, 1236.5017415315638));
    }

    #[test]
    fn unreachable_angle_is_an_error() {
        let s = solver();
        assert!(matches!(s.solve(70.0), Err(GeometryError::Infeasible { .. })));
        assert!(matches!(s.solve(-70.0), Err(GeometryError::Infeasible { .. })));
        assert!(s.servo_angle(50.0).is_err());
    }

    #[test]
    fn non_finite_input_rejected() {
        assert!(matches!(solver().solve(f64::NAN), Err(GeometryError::NonFinite(_))));
        assert!(matches!(solver().solve(f64::INFINITY), Err(GeometryError::NonFinite(_))));
    }

    #[test]
    fn invalid_geometry_rejected() {
        let geometry = VehicleGeometry {
            bridge: 0.0,
            ..VehicleGeometry::default()
        };
        assert!(matches!(
            SteeringSolver::new(geometry),
            Err(ConfigError::NonPositiveDimension { name: "bridge", .. })
        ));
    }
}
