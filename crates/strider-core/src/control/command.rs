//! Operator-facing command types
//!
//! One [`QuadrupedCommand`] per ingress call; only the fields matching the
//! requested mode are consulted by the controllers.

use serde::{Deserialize, Serialize};

use crate::math::{Transform, Vector3};

/// Engine operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// All joints unpowered
    #[default]
    Stopped,
    /// Entered only by the engine itself; joints actively hold position
    Fault,
    /// All joints hold zero velocity
    ZeroVelocity,
    /// Operator joint commands pass through unchanged
    Joint,
    /// Operator commands feet in body or robot frame
    Leg,
    /// Scripted stand-up from the rest pose
    StandUp,
}

/// A command for one joint
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JointCommand {
    pub id: u8,
    /// Drive the servo at all; false emits a stop
    pub power: bool,
    /// Hold zero velocity instead of tracking a position
    pub zero_velocity: bool,
    /// Commanded angle (degrees); NaN leaves the angle free
    pub angle_deg: f64,
    /// Commanded velocity (degrees/second)
    pub velocity_dps: f64,
    /// Feedforward torque (N·m)
    pub torque_nm: f64,
    /// Proportional gain scale in [0, 1]
    pub kp_scale: Option<f64>,
    /// Derivative gain scale in [0, 1]
    pub kd_scale: Option<f64>,
    /// Torque ceiling (N·m)
    pub max_torque_nm: Option<f64>,
    /// Angle at which motion stops (degrees); a hard stop target
    pub stop_angle_deg: Option<f64>,
}

/// A command for one leg's foot, in body frame B or robot frame R
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LegCommand {
    pub leg: u8,
    pub power: bool,
    pub zero_velocity: bool,
    /// Desired foot position (millimetres)
    pub position_mm: Vector3,
    /// Desired foot velocity (millimetres/second)
    pub velocity_mm_s: Vector3,
    /// Desired foot force (newtons)
    pub force_n: Vector3,
    /// Per-axis proportional gain scale; only the X component reaches the
    /// joints today
    pub kp_scale: Option<Vector3>,
    /// Per-axis derivative gain scale; only the X component reaches the
    /// joints today
    pub kd_scale: Option<Vector3>,
}

/// The operator command consumed at the start of each control step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuadrupedCommand {
    pub mode: Mode,
    /// Joint-mode targets
    pub joints: Vec<JointCommand>,
    /// Leg-mode targets in body frame
    pub legs_b: Vec<LegCommand>,
    /// Leg-mode targets in robot frame
    pub legs_r: Vec<LegCommand>,
    /// Stand-up body target: support frame S relative to robot frame R
    #[serde(rename = "stand_up_pose_mm_SR", default)]
    pub stand_up_pose_mm_sr: Transform,
}
