//! Telemetry records and the engine's named topic set
//!
//! Three topics, published in a fixed order: `qc_command` on ingress
//! (asynchronously from the cycle), `qc_control` after the controller runs,
//! `qc_status` after the command write completes. Payloads are `Arc`-wrapped
//! copies owned by the subscriber.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::command::{JointCommand, LegCommand, QuadrupedCommand};
use super::state::Status;
use crate::comm::Topic;

/// Topic name for per-cycle status records
pub const STATUS_TOPIC: &str = "qc_status";
/// Topic name for operator command records
pub const COMMAND_TOPIC: &str = "qc_command";
/// Topic name for per-cycle controller output records
pub const CONTROL_TOPIC: &str = "qc_control";

/// A received operator command, copied on ingress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandLog {
    pub timestamp: f64,
    pub command: QuadrupedCommand,
}

/// What the active controller produced this cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlLog {
    pub timestamp: f64,
    pub joints: Vec<JointCommand>,
    pub legs_b: Vec<LegCommand>,
    pub legs_r: Vec<LegCommand>,
}

/// The engine's publish side
#[derive(Clone)]
pub struct Telemetry {
    pub status: Topic<Arc<Status>>,
    pub command: Topic<Arc<CommandLog>>,
    pub control: Topic<Arc<ControlLog>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            status: Topic::new(STATUS_TOPIC),
            command: Topic::new(COMMAND_TOPIC),
            control: Topic::new(CONTROL_TOPIC),
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
