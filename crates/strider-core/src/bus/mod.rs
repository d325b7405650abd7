//! Servo register bus: codec, frame construction, and the transport trait
//!
//! The servos are register-addressed devices on a shared multiplexed bus.
//! One transaction carries a batch of per-device requests and returns the
//! matching batch of replies. This module owns the wire-level vocabulary
//! (registers, modes, fixed-point values), the frames the engine exchanges
//! every cycle, and the [`RegisterClient`] trait the actual link implements.

mod client;
mod frame;
mod mock;
mod registers;

pub use client::{
    DeviceReply, DeviceRequest, RegisterClient, RegisterOp, Reply, Request, MAX_COMMAND_VALUES,
};
pub use frame::{command_frame, status_request, PositionWrite};
pub use mock::MockClient;
pub use registers::{
    read_int, read_position, read_pwm, read_temperature, read_torque, read_velocity, read_voltage,
    write_position, write_pwm, write_torque, write_velocity, Register, Resolution, ServoMode, Value,
};
