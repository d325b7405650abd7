//! strider-core: real-time control engine for the Strider quadruped
//!
//! The engine runs a fixed-period sense–plan–actuate cycle over twelve servo
//! joints on a shared register-addressed bus: read telemetry from every
//! joint, build a whole-robot snapshot, run the active mode's controller,
//! and write the resulting joint commands back out — at most one bus
//! transaction in flight at any time.
//!
//! # Modules
//!
//! - [`math`] - Quaternions and rigid (SE3) transforms
//! - [`comm`] - Channels and pub-sub topics used for telemetry
//! - [`config`] - Robot geometry and stand-up configuration
//! - [`bus`] - Servo register protocol: codec, frames, transport trait
//! - [`kinematics`] - Per-leg analytic forward/inverse kinematics
//! - [`control`] - The engine, its controllers, and the cycle loop
//!
//! # Architecture
//!
//! ```text
//! operator ──command──► QuadrupedEngine ◄──fixed-period tick── ControlLoop
//!                            │  ▲
//!                       write│  │read            qc_status / qc_command /
//!                            ▼  │                qc_control topics ──►
//!                      RegisterClient (bus)
//! ```

#![warn(unused_must_use)]

pub mod bus;
pub mod comm;
pub mod config;
pub mod control;
pub mod kinematics;
pub mod math;

// Re-exports for convenience
pub use bus::{RegisterClient, Reply, Request};
pub use comm::{Receiver, Sender, Topic};
pub use config::Config;
pub use control::{Mode, Parameters, QuadrupedCommand, QuadrupedEngine, Status};
pub use math::{Quaternion, Transform};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for strider-core
///
/// All errors should be handled appropriately. Use pattern matching to
/// handle specific error cases, or use `?` to propagate errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid robot configuration (wrong leg/joint counts, unresolvable
    /// joint ids, unparsable file). Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bus-level error from the servo transport. The engine treats a failed
    /// status or command transaction as fatal and surfaces it unchanged.
    #[error("Bus error: {0}")]
    Bus(String),

    /// A register value could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Error in inter-thread communication.
    #[error("Communication error: {0}")]
    Communication(String),

    /// Control loop timing or execution error.
    #[error("Control loop error: {0}")]
    ControlLoop(String),

    /// Communication channel was closed unexpectedly.
    #[error("Channel closed")]
    ChannelClosed,

    /// Channel is full (backpressure).
    #[error("Channel full")]
    ChannelFull,

    /// Operation attempted in invalid state (e.g. commanding an engine
    /// that has already surfaced a fatal bus error).
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(format!("I/O error: {}", e))
    }
}

/// Result type alias for strider-core operations
pub type Result<T> = std::result::Result<T, Error>;
