//! The two frames the engine exchanges each cycle
//!
//! The status read asks every joint for {mode, position, velocity, torque}
//! at int16 and {voltage, temperature, fault} at int8. The command write
//! always leads with a mode write; in position mode it appends a trailing
//! block at [`Register::CommandPosition`] whose length is the index of the
//! highest field actually set plus one — earlier slots are filled with
//! explicitly-encoded defaults so the block stays positional.

use arrayvec::ArrayVec;

use super::client::{DeviceRequest, RegisterOp, Request, MAX_COMMAND_VALUES};
use super::registers::{
    write_position, write_pwm, write_torque, write_velocity, Register, Resolution, ServoMode, Value,
};
use crate::config::JointConfig;

/// Build the per-cycle status read for the configured joints
pub fn status_request(joints: &[JointConfig]) -> Request {
    let mut request = Request::default();
    for joint in joints {
        request.requests.push(DeviceRequest {
            id: joint.id,
            ops: vec![
                // mode, position, velocity, torque
                RegisterOp::ReadMultiple {
                    start: Register::Mode,
                    count: 4,
                    resolution: Resolution::Int16,
                },
                // voltage, temperature, fault
                RegisterOp::ReadMultiple {
                    start: Register::Voltage,
                    count: 3,
                    resolution: Resolution::Int8,
                },
            ],
        });
    }
    request
}

/// Position-mode command content, sign conventions already applied
///
/// `angle_deg` may be NaN, meaning "no commanded angle" (slew against the
/// stop angle instead); NaN still occupies its slot in the trailing block.
#[derive(Debug, Clone, Copy)]
pub struct PositionWrite {
    pub angle_deg: f64,
    pub velocity_dps: f64,
    pub torque_nm: f64,
    pub kp_scale: Option<f64>,
    pub kd_scale: Option<f64>,
    pub max_torque_nm: Option<f64>,
    pub stop_angle_deg: Option<f64>,
}

impl PositionWrite {
    fn values(&self) -> ArrayVec<Value, MAX_COMMAND_VALUES> {
        // Slot layout: [position, velocity, torque, kp, kd, max torque,
        // stop angle]. Truncate past the last field that was set; a zero
        // numeric field or absent optional field at the tail is omitted.
        let mut len = 0;
        if self.angle_deg != 0.0 {
            len = 1;
        }
        if self.velocity_dps != 0.0 {
            len = 2;
        }
        if self.torque_nm != 0.0 {
            len = 3;
        }
        if self.kp_scale.is_some() {
            len = 4;
        }
        if self.kd_scale.is_some() {
            len = 5;
        }
        if self.max_torque_nm.is_some() {
            len = 6;
        }
        if self.stop_angle_deg.is_some() {
            len = 7;
        }

        let mut values = ArrayVec::new();
        for slot in 0..len {
            values.push(match slot {
                0 => write_position(self.angle_deg),
                1 => write_velocity(self.velocity_dps),
                2 => write_torque(self.torque_nm),
                3 => write_pwm(self.kp_scale.unwrap_or(1.0)),
                4 => write_pwm(self.kd_scale.unwrap_or(1.0)),
                5 => write_torque(self.max_torque_nm.unwrap_or(f64::INFINITY)),
                6 => write_position(self.stop_angle_deg.unwrap_or(f64::NAN)),
                _ => unreachable!(),
            });
        }
        values
    }
}

/// Build one joint's command frame
///
/// Stopped and PositionTimeout frames carry the mode write alone;
/// `position` is only consulted in [`ServoMode::Position`].
pub fn command_frame(id: u8, mode: ServoMode, position: Option<&PositionWrite>) -> DeviceRequest {
    let mut ops = vec![RegisterOp::WriteSingle {
        register: Register::Mode,
        value: Value::Int8(mode as i8),
    }];

    if mode == ServoMode::Position {
        if let Some(position) = position {
            let values = position.values();
            if !values.is_empty() {
                ops.push(RegisterOp::WriteMultiple {
                    start: Register::CommandPosition,
                    values,
                });
            }
        }
    }

    DeviceRequest { id, ops }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_fixtures::test_config;

    fn trailing_values(frame: &DeviceRequest) -> Option<&ArrayVec<Value, MAX_COMMAND_VALUES>> {
        frame.ops.iter().find_map(|op| match op {
            RegisterOp::WriteMultiple { start, values } => {
                assert_eq!(*start, Register::CommandPosition);
                Some(values)
            }
            _ => None,
        })
    }

    #[test]
    fn test_status_request_shape() {
        let config = test_config();
        let request = status_request(&config.joints);
        assert_eq!(request.requests.len(), 12);
        for (joint, device) in config.joints.iter().zip(&request.requests) {
            assert_eq!(device.id, joint.id);
            assert_eq!(
                device.ops[0],
                RegisterOp::ReadMultiple {
                    start: Register::Mode,
                    count: 4,
                    resolution: Resolution::Int16,
                }
            );
            assert_eq!(
                device.ops[1],
                RegisterOp::ReadMultiple {
                    start: Register::Voltage,
                    count: 3,
                    resolution: Resolution::Int8,
                }
            );
        }
    }

    #[test]
    fn test_stopped_frame_is_mode_only() {
        let frame = command_frame(3, ServoMode::Stopped, None);
        assert_eq!(frame.id, 3);
        assert_eq!(
            frame.ops,
            vec![RegisterOp::WriteSingle {
                register: Register::Mode,
                value: Value::Int8(0),
            }]
        );
    }

    #[test]
    fn test_position_timeout_frame_is_mode_only() {
        let frame = command_frame(
            4,
            ServoMode::PositionTimeout,
            Some(&PositionWrite {
                angle_deg: 45.0,
                velocity_dps: 10.0,
                torque_nm: 0.0,
                kp_scale: None,
                kd_scale: None,
                max_torque_nm: None,
                stop_angle_deg: None,
            }),
        );
        assert_eq!(frame.ops.len(), 1);
        assert_eq!(
            frame.ops[0],
            RegisterOp::WriteSingle {
                register: Register::Mode,
                value: Value::Int8(11),
            }
        );
    }

    #[test]
    fn test_trailing_block_truncates_at_highest_set_field() {
        // Only velocity set: block is [position, velocity]
        let frame = command_frame(
            1,
            ServoMode::Position,
            Some(&PositionWrite {
                angle_deg: 0.0,
                velocity_dps: 90.0,
                torque_nm: 0.0,
                kp_scale: None,
                kd_scale: None,
                max_torque_nm: None,
                stop_angle_deg: None,
            }),
        );
        let values = trailing_values(&frame).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], write_position(0.0));
        assert_eq!(values[1], write_velocity(90.0));
    }

    #[test]
    fn test_stop_angle_forces_full_block_with_defaults() {
        let frame = command_frame(
            7,
            ServoMode::Position,
            Some(&PositionWrite {
                angle_deg: f64::NAN,
                velocity_dps: 30.0,
                torque_nm: 0.0,
                kp_scale: None,
                kd_scale: None,
                max_torque_nm: Some(3.0),
                stop_angle_deg: Some(135.0),
            }),
        );
        let values = trailing_values(&frame).unwrap();
        assert_eq!(values.len(), 7);
        assert_eq!(values[0], Value::Int16(i16::MIN)); // NaN angle
        assert_eq!(values[1], write_velocity(30.0));
        assert_eq!(values[2], write_torque(0.0));
        assert_eq!(values[3], write_pwm(1.0)); // default kp
        assert_eq!(values[4], write_pwm(1.0)); // default kd
        assert_eq!(values[5], write_torque(3.0));
        assert_eq!(values[6], write_position(135.0));
    }

    #[test]
    fn test_all_zero_position_write_has_no_trailing_block() {
        let frame = command_frame(
            2,
            ServoMode::Position,
            Some(&PositionWrite {
                angle_deg: 0.0,
                velocity_dps: 0.0,
                torque_nm: 0.0,
                kp_scale: None,
                kd_scale: None,
                max_torque_nm: None,
                stop_angle_deg: None,
            }),
        );
        assert_eq!(frame.ops.len(), 1);
    }
}
