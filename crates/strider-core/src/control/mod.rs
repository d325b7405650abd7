//! The control engine and its cycle machinery
//!
//! [`QuadrupedEngine`] owns the per-cycle logic (snapshot, mode machine,
//! controllers, command emission); [`ControlLoop`] provides the fixed-period
//! timer; [`spawn_engine`] wires the two together with operator command
//! ingress on a dedicated thread.

mod command;
mod control_loop;
mod engine;
mod runner;
mod state;
mod telemetry;

pub use command::{JointCommand, LegCommand, Mode, QuadrupedCommand};
pub use control_loop::{ControlLoop, ControlLoopConfig, ControlLoopHandle, ControlLoopStats};
pub use engine::{Parameters, QuadrupedEngine};
pub use runner::{spawn_engine, EngineHandle};
pub use state::{
    JointState, LegState, LinkState, QuadrupedState, RobotPose, StandUpMode, StandUpState, Status,
};
pub use telemetry::{CommandLog, ControlLog, Telemetry, COMMAND_TOPIC, CONTROL_TOPIC, STATUS_TOPIC};
