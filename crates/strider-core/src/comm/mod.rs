//! Communication primitives
//!
//! Channels for operator command ingress and pub-sub topics for the
//! engine's telemetry streams. Everything here is in-process; remote
//! transports live outside this crate.

mod channel;
mod topic;

pub use channel::{bounded_channel, unbounded_channel, Receiver, Sender};
pub use topic::{Topic, TopicConfig};
