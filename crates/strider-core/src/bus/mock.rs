//! Mock bus client for tests and benches
//!
//! Models the servo farm as a raw register store per device id. Reads are
//! served from the store at the requested width, writes land in it, and the
//! full request history is recorded. Devices can be silenced (no reply
//! entry, the way a powered-off servo fails) and the next transaction can
//! be made to fail at the link level.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::client::{DeviceReply, RegisterClient, RegisterOp, Reply, Request};
use super::registers::{write_position, Register, Resolution, Value};
use crate::{Error, Result};

#[derive(Default)]
struct MockInner {
    registers: HashMap<u8, BTreeMap<u16, i32>>,
    silent: HashSet<u8>,
    fail_next: Option<String>,
    requests: Vec<Request>,
}

/// Shared-state mock transport
///
/// Clones share the same register store, so a test can keep one handle
/// while the engine owns another.
#[derive(Clone, Default)]
pub struct MockClient {
    inner: Arc<Mutex<MockInner>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw register value on a device
    pub fn set_raw(&self, id: u8, register: Register, raw: i32) {
        self.inner
            .lock()
            .registers
            .entry(id)
            .or_default()
            .insert(register as u16, raw);
    }

    /// Set a device's position register from degrees (int16 encoding)
    pub fn set_angle_deg(&self, id: u8, angle_deg: f64) {
        self.set_raw(id, Register::Position, write_position(angle_deg).raw());
    }

    /// Read back a raw register value (0 when never written)
    pub fn raw(&self, id: u8, register: Register) -> i32 {
        self.raw_at(id, register as u16)
    }

    /// Read back a raw register value by register number, for slots inside
    /// a multi-register block
    pub fn raw_at(&self, id: u8, register: u16) -> i32 {
        self.inner
            .lock()
            .registers
            .get(&id)
            .and_then(|regs| regs.get(&register).copied())
            .unwrap_or(0)
    }

    /// Make a device stop answering status reads
    pub fn silence(&self, id: u8, silent: bool) {
        let mut inner = self.inner.lock();
        if silent {
            inner.silent.insert(id);
        } else {
            inner.silent.remove(&id);
        }
    }

    /// Fail the next transaction with a link-level error
    pub fn fail_next(&self, message: impl Into<String>) {
        self.inner.lock().fail_next = Some(message.into());
    }

    /// Number of transactions issued so far
    pub fn transaction_count(&self) -> usize {
        self.inner.lock().requests.len()
    }

    /// Clone of the recorded request history
    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().requests.clone()
    }

    /// The most recent request, if any
    pub fn last_request(&self) -> Option<Request> {
        self.inner.lock().requests.last().cloned()
    }

    fn materialize(raw: i32, resolution: Resolution) -> Value {
        match resolution {
            Resolution::Int8 => Value::Int8(raw as i8),
            Resolution::Int16 => Value::Int16(raw as i16),
            Resolution::Int32 => Value::Int32(raw),
        }
    }
}

impl RegisterClient for MockClient {
    fn transact(&mut self, request: &Request) -> Result<Reply> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next.take() {
            inner.requests.push(request.clone());
            return Err(Error::Bus(message));
        }

        inner.requests.push(request.clone());

        let mut reply = Reply::default();
        for device in &request.requests {
            if inner.silent.contains(&device.id) {
                continue;
            }

            let mut device_reply = DeviceReply {
                id: device.id,
                values: BTreeMap::new(),
            };

            for op in &device.ops {
                match op {
                    RegisterOp::ReadMultiple {
                        start,
                        count,
                        resolution,
                    } => {
                        let registers = inner.registers.entry(device.id).or_default();
                        for k in 0..*count {
                            let reg = *start as u16 + k as u16;
                            let raw = registers.get(&reg).copied().unwrap_or(0);
                            device_reply
                                .values
                                .insert(reg, Self::materialize(raw, *resolution));
                        }
                    }
                    RegisterOp::WriteSingle { register, value } => {
                        inner
                            .registers
                            .entry(device.id)
                            .or_default()
                            .insert(*register as u16, value.raw());
                    }
                    RegisterOp::WriteMultiple { start, values } => {
                        let registers = inner.registers.entry(device.id).or_default();
                        for (k, value) in values.iter().enumerate() {
                            registers.insert(*start as u16 + k as u16, value.raw());
                        }
                    }
                }
            }

            reply.replies.push(device_reply);
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::frame::status_request;
    use crate::config::test_fixtures::test_config;

    #[test]
    fn test_reads_default_to_zero() {
        let mut client = MockClient::new();
        let reply = client.transact(&status_request(&test_config().joints)).unwrap();
        assert_eq!(reply.replies.len(), 12);
        let first = &reply.replies[0];
        assert_eq!(first.value(Register::Mode), Some(Value::Int16(0)));
        assert_eq!(first.value(Register::Voltage), Some(Value::Int8(0)));
    }

    #[test]
    fn test_silenced_device_missing_from_reply() {
        let mut client = MockClient::new();
        client.silence(5, true);
        let reply = client.transact(&status_request(&test_config().joints)).unwrap();
        assert_eq!(reply.replies.len(), 11);
        assert!(reply.replies.iter().all(|r| r.id != 5));
    }

    #[test]
    fn test_writes_land_in_store() {
        let mut client = MockClient::new();
        let request = Request {
            requests: vec![crate::bus::frame::command_frame(
                9,
                crate::bus::ServoMode::PositionTimeout,
                None,
            )],
        };
        client.transact(&request).unwrap();
        assert_eq!(client.raw(9, Register::Mode), 11);
        assert_eq!(client.transaction_count(), 1);
    }

    #[test]
    fn test_fail_next() {
        let mut client = MockClient::new();
        client.fail_next("link down");
        let err = client.transact(&Request::default()).unwrap_err();
        assert!(err.to_string().contains("link down"));
        // Subsequent transactions succeed again.
        assert!(client.transact(&Request::default()).is_ok());
    }
}
