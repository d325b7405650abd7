//! Math utilities: quaternions, rigid transforms, and angle helpers
//!
//! Mathematical primitives for the control engine, built on top of nalgebra.
//! Linear quantities throughout the crate are millimetres and the frame
//! conventions (body frame B, leg geometry frame G, robot frame R, support
//! frame S) are documented on the types that carry them.

mod quaternion;
mod transform;

pub use quaternion::Quaternion;
pub use transform::Transform;

/// Type alias for 3D vectors
pub type Vector3 = nalgebra::Vector3<f64>;

/// Type alias for 3x3 matrices
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// Degrees to radians
#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// Radians to degrees
#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// Normalize an angle to [-π, π]
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
    angle - TWO_PI * (angle / TWO_PI + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_deg_rad_roundtrip() {
        for deg in [-270.0, -90.0, 0.0, 45.0, 135.0] {
            assert_relative_eq!(rad_to_deg(deg_to_rad(deg)), deg, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(0.0), 0.0, epsilon = 1e-10);
        // PI and -PI are equivalent; the branchless formula maps PI -> -PI
        assert_relative_eq!(normalize_angle(PI).abs(), PI, epsilon = 1e-10);
        assert_relative_eq!(normalize_angle(3.0 * PI).abs(), PI, epsilon = 1e-10);
        assert_relative_eq!(normalize_angle(2.0 * PI), 0.0, epsilon = 1e-10);
    }
}
