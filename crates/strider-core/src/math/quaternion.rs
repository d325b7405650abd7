//! Quaternion implementation for 3D rotations
//!
//! Wrapper around nalgebra's UnitQuaternion with robotics-friendly APIs.

use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

use super::{Matrix3, Vector3};

/// A unit quaternion representing a 3D rotation
///
/// Uses Hamilton convention (w, x, y, z) where w is the scalar part.
/// Always normalized to unit length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// Scalar component (w)
    pub w: f64,
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Quaternion {
    /// Create a new quaternion from components (automatically normalized)
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        let norm_sq = w * w + x * x + y * y + z * z;
        if norm_sq > 1e-20 {
            let inv_norm = 1.0 / norm_sq.sqrt();
            Self {
                w: w * inv_norm,
                x: x * inv_norm,
                y: y * inv_norm,
                z: z * inv_norm,
            }
        } else {
            Self { w, x, y, z }
        }
    }

    /// Identity quaternion (no rotation)
    pub const fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Create from Euler angles (roll, pitch, yaw) in radians
    ///
    /// Uses ZYX convention (yaw around Z, then pitch around Y, then roll
    /// around X).
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::from_nalgebra(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Create from axis-angle representation
    pub fn from_axis_angle(axis: Vector3, angle: f64) -> Self {
        match nalgebra::Unit::try_new(axis, 1e-10) {
            Some(unit_axis) => {
                Self::from_nalgebra(UnitQuaternion::from_axis_angle(&unit_axis, angle))
            }
            None => Self::identity(),
        }
    }

    /// Convert from nalgebra's UnitQuaternion
    pub fn from_nalgebra(uq: UnitQuaternion<f64>) -> Self {
        Self {
            w: uq.w,
            x: uq.i,
            y: uq.j,
            z: uq.k,
        }
    }

    /// Convert to nalgebra's UnitQuaternion
    pub fn to_nalgebra(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(self.w, self.x, self.y, self.z))
    }

    /// Get Euler angles (roll, pitch, yaw) in radians
    pub fn to_euler(&self) -> (f64, f64, f64) {
        self.to_nalgebra().euler_angles()
    }

    /// Convert to a 3x3 rotation matrix
    pub fn to_rotation_matrix(&self) -> Matrix3 {
        self.to_nalgebra().to_rotation_matrix().into_inner()
    }

    /// Multiply two quaternions (compose rotations): self * other
    pub fn multiply(&self, other: &Quaternion) -> Quaternion {
        Self::from_nalgebra(self.to_nalgebra() * other.to_nalgebra())
    }

    /// Get the inverse (conjugate for unit quaternions)
    pub fn inverse(&self) -> Quaternion {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate_vector(&self, v: Vector3) -> Vector3 {
        self.to_nalgebra().transform_vector(&v)
    }

    /// Dot product with another quaternion
    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}
