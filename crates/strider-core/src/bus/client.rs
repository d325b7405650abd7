//! Bus transport contract
//!
//! One [`Request`] batches ordered per-device operations; the transport
//! returns a [`Reply`] with one entry per device that answered. The engine
//! issues at most one transaction at a time and owns the bus exclusively
//! while it is in flight.

use std::collections::BTreeMap;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use super::registers::{Register, Resolution, Value};
use crate::Result;

/// Most trailing values a single write frame can carry
/// (position, velocity, torque, kp, kd, max torque, stop angle)
pub const MAX_COMMAND_VALUES: usize = 7;

/// A single register operation addressed to one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegisterOp {
    /// Read `count` consecutive registers starting at `start`
    ReadMultiple {
        start: Register,
        count: u8,
        resolution: Resolution,
    },
    /// Write one register
    WriteSingle { register: Register, value: Value },
    /// Write consecutive registers starting at `start`
    WriteMultiple {
        start: Register,
        values: ArrayVec<Value, MAX_COMMAND_VALUES>,
    },
}

/// The operations for one device in a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRequest {
    /// Bus id of the device
    pub id: u8,
    pub ops: Vec<RegisterOp>,
}

/// One device's reply: decoded values keyed by raw register number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceReply {
    pub id: u8,
    pub values: BTreeMap<u16, Value>,
}

impl DeviceReply {
    /// Look up a register in this reply
    pub fn value(&self, register: Register) -> Option<Value> {
        self.values.get(&(register as u16)).copied()
    }
}

/// A full bus transaction request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub requests: Vec<DeviceRequest>,
}

/// A full bus transaction reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub replies: Vec<DeviceReply>,
}

/// The transport the engine drives
///
/// `transact` blocks until every device request has been sent and the
/// replies collected. Errors are link-level failures; a device simply not
/// answering shows up as a missing entry in the reply, not an error.
pub trait RegisterClient: Send {
    fn transact(&mut self, request: &Request) -> Result<Reply>;
}
