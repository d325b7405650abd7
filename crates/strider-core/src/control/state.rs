//! Snapshot types the engine rebuilds every cycle

use serde::{Deserialize, Serialize};

use super::command::Mode;
use crate::math::{Transform, Vector3};

/// One joint's decoded telemetry, sign convention already applied
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JointState {
    pub id: u8,
    /// Raw servo mode register
    pub mode: i32,
    pub angle_deg: f64,
    pub velocity_dps: f64,
    pub torque_nm: f64,
    pub voltage: f64,
    pub temperature_c: f64,
    /// Raw servo fault register; 0 is healthy
    pub fault: i32,
}

/// One link of a leg chain (the same joint data, ordered by chain position)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinkState {
    pub id: u8,
    pub angle_deg: f64,
    pub velocity_dps: f64,
    pub torque_nm: f64,
}

/// One leg's foot state in body frame, plus its chain links in
/// shoulder-femur-tibia order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegState {
    pub leg: u8,
    pub position_mm: Vector3,
    pub velocity_mm_s: Vector3,
    pub force_n: Vector3,
    pub links: Vec<LinkState>,
}

/// Frame relationships tracked for operator intent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RobotPose {
    /// Robot frame R relative to body frame B
    #[serde(rename = "pose_mm_RB")]
    pub pose_mm_rb: Transform,
    /// Support frame S relative to robot frame R
    #[serde(rename = "pose_mm_SR")]
    pub pose_mm_sr: Transform,
}

/// Stand-up submachine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StandUpMode {
    /// Slewing all joints against the preposition hard stops
    #[default]
    Prepositioning,
    /// Lifting the body toward the commanded support pose
    Standing,
    /// Terminal; never exited autonomously
    Done,
}

/// Stand-up submachine state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StandUpState {
    pub mode: StandUpMode,
}

/// The whole-robot snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuadrupedState {
    pub joints: Vec<JointState>,
    pub legs_b: Vec<LegState>,
    pub robot: RobotPose,
    pub stand_up: StandUpState,
}

/// Everything the engine publishes about itself after each cycle
///
/// Timestamps are monotonic seconds since engine construction. The timing
/// fields split one cycle into its status-read, control, and command-write
/// phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    pub mode: Mode,
    /// When the current mode was entered
    pub mode_start: f64,
    /// Message from the most recent fault; persists until the next fault
    pub fault: String,
    pub timestamp: f64,
    pub state: QuadrupedState,
    pub time_status_s: f64,
    pub time_control_s: f64,
    pub time_command_s: f64,
    pub time_cycle_s: f64,
}
