//! Per-leg kinematics
//!
//! Forward and inverse kinematics for a mammal-style 3-DoF leg, expressed
//! in that leg's geometry frame G. Frame conversion to and from the body
//! frame happens in the engine via each leg's configured rigid transform.

mod mammal;

pub use mammal::{Effector, IkJointState, IkOutput, MammalIk};
