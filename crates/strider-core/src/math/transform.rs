//! SE(3) rigid transforms
//!
//! Represents position and orientation in 3D space. The engine uses these
//! for the frame relationships it tracks: leg geometry to body
//! (`pose_mm_BG`), robot to body (`pose_mm_RB`), and support to robot
//! (`pose_mm_SR`). Translations are millimetres.

use serde::{Deserialize, Serialize};

use super::{Quaternion, Vector3};

/// A rigid body transformation in 3D space (SE3)
///
/// `t.transform_point(p)` maps a point expressed in the source frame into
/// the destination frame; a transform named `pose_mm_BG` maps G-frame
/// points B-ward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation in millimetres
    pub translation: Vector3,
    /// Orientation as a unit quaternion
    pub rotation: Quaternion,
}

impl Transform {
    /// Create a new transform from translation and rotation
    pub fn new(translation: Vector3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Identity transform (no translation, no rotation)
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Quaternion::identity(),
        }
    }

    /// Create from translation only (identity rotation)
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            translation: Vector3::new(x, y, z),
            rotation: Quaternion::identity(),
        }
    }

    /// Create from Euler angles (roll, pitch, yaw) and translation
    pub fn from_euler(translation: Vector3, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            translation,
            rotation: Quaternion::from_euler(roll, pitch, yaw),
        }
    }

    /// Compose two transforms: self * other
    ///
    /// The result represents applying `other` first, then `self`.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform {
            translation: self.translation + self.rotation.rotate_vector(other.translation),
            rotation: self.rotation.multiply(&other.rotation),
        }
    }

    /// Get the inverse transform
    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.inverse();
        Transform {
            translation: -inv_rotation.rotate_vector(self.translation),
            rotation: inv_rotation,
        }
    }

    /// Transform a 3D point (rotation then translation)
    pub fn transform_point(&self, point: Vector3) -> Vector3 {
        self.rotation.rotate_vector(point) + self.translation
    }

    /// Transform a 3D vector (rotation only, no translation)
    ///
    /// Use this for velocities and forces, which are frame-rotated but not
    /// offset.
    pub fn transform_vector(&self, vector: Vector3) -> Vector3 {
        self.rotation.rotate_vector(vector)
    }

    /// Distance between two transforms (translation only, millimetres)
    pub fn translation_distance(&self, other: &Transform) -> f64 {
        (self.translation - other.translation).norm()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(&rhs)
    }
}
