//! The quadruped control engine
//!
//! One [`QuadrupedEngine::run_cycle`] call is one sense–plan–actuate
//! iteration: read every joint's telemetry in a single bus transaction,
//! rebuild the robot snapshot, step the mode machine, run the active
//! mode's controller, and write the resulting joint frames back out. The
//! `outstanding` guard keeps at most one bus transaction in flight; a tick
//! that arrives while a cycle is still running is dropped, never queued.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::bus::{
    command_frame, read_int, read_position, read_temperature, read_torque, read_velocity,
    read_voltage, status_request, PositionWrite, Register, RegisterClient, Reply, Request,
    ServoMode,
};
use crate::config::{Config, LegConfig, NUM_JOINTS};
use crate::kinematics::{Effector, IkJointState, MammalIk};
use crate::math::Transform;
use crate::Result;

use super::command::{JointCommand, LegCommand, Mode, QuadrupedCommand};
use super::state::{JointState, LegState, LinkState, StandUpMode, Status};
use super::telemetry::{CommandLog, ControlLog, Telemetry};

/// Engine parameters
#[derive(Debug, Clone)]
pub struct Parameters {
    /// Path to the robot configuration document
    pub config: PathBuf,
    /// Cycle period (seconds)
    pub period_s: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            config: PathBuf::new(),
            period_s: 0.01,
        }
    }
}

/// A configured leg with its solver
struct Leg {
    leg: u8,
    config: LegConfig,
    pose_mm_bg: Transform,
    ik: MammalIk,
}

impl Leg {
    fn new(config: LegConfig) -> Self {
        Self {
            leg: config.leg,
            pose_mm_bg: config.pose_mm_bg,
            ik: MammalIk::new(config.ik),
            config,
        }
    }
}

/// Phase timestamps for the cycle in progress
#[derive(Debug, Clone, Copy, Default)]
struct Timestamps {
    cycle_start: f64,
    status_done: f64,
    control_done: f64,
    command_done: f64,
}

/// The control engine
///
/// Single-threaded by construction: every mutation happens inside
/// [`command`](Self::command) or [`run_cycle`](Self::run_cycle), and the
/// caller (normally [`spawn_engine`](super::spawn_engine)) serializes those
/// calls on one thread.
pub struct QuadrupedEngine {
    config: Config,
    parameters: Parameters,
    legs: Vec<Leg>,
    signs: HashMap<u8, f64>,

    status: Status,
    current_command: Option<QuadrupedCommand>,
    control_log: ControlLog,

    client: Option<Box<dyn RegisterClient>>,
    status_request: Request,
    client_command: Request,
    outstanding: bool,

    telemetry: Telemetry,
    epoch: Instant,
    timestamps: Timestamps,
}

impl QuadrupedEngine {
    /// Build an engine from an already-validated configuration
    pub fn new(config: Config, parameters: Parameters) -> Result<Self> {
        config.validate()?;

        let legs = config.legs.iter().cloned().map(Leg::new).collect();
        let signs = config.joints.iter().map(|j| (j.id, j.sign)).collect();
        let status_request = status_request(&config.joints);

        Ok(Self {
            config,
            parameters,
            legs,
            signs,
            status: Status::default(),
            current_command: None,
            control_log: ControlLog::default(),
            client: None,
            status_request,
            client_command: Request::default(),
            outstanding: false,
            telemetry: Telemetry::new(),
            epoch: Instant::now(),
            timestamps: Timestamps::default(),
        })
    }

    /// Load the configuration named by `parameters.config` and build an
    /// engine from it
    pub fn from_parameters(parameters: Parameters) -> Result<Self> {
        let config = Config::load(&parameters.config)?;
        Self::new(config, parameters)
    }

    /// Attach the bus transport. Without one, cycles are dropped silently.
    pub fn set_client(&mut self, client: Box<dyn RegisterClient>) {
        self.client = Some(client);
    }

    /// Release the bus transport
    pub fn detach_client(&mut self) -> Option<Box<dyn RegisterClient>> {
        self.client.take()
    }

    /// The engine's telemetry topics
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// The most recent status record
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// The engine parameters
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Whether a bus transaction is currently in flight
    pub fn outstanding(&self) -> bool {
        self.outstanding
    }

    /// Monotonic seconds since engine construction
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn sign(&self, id: u8) -> f64 {
        *self
            .signs
            .get(&id)
            .unwrap_or_else(|| unreachable!("joint id {} not in configuration", id))
    }

    fn get_leg(&self, leg: u8) -> &Leg {
        self.legs
            .iter()
            .find(|l| l.leg == leg)
            .unwrap_or_else(|| unreachable!("leg id {} not in configuration", leg))
    }

    /// Ingest an operator command
    ///
    /// The command is copied into engine-owned storage and consulted at the
    /// start of the next cycle's control step; a later command overwrites an
    /// earlier unobserved one.
    pub fn command(&mut self, command: QuadrupedCommand) {
        let log = CommandLog {
            timestamp: self.now(),
            command: command.clone(),
        };
        self.current_command = Some(command);
        self.telemetry.command.publish(Arc::new(log));
    }

    /// Run one cycle
    ///
    /// Drops the tick silently when no transport is attached or a previous
    /// cycle is still outstanding. Skips the cycle (with a warning) when
    /// fewer than all twelve joints answered the status read. A transport
    /// error is fatal: it is surfaced unchanged, `outstanding` stays set,
    /// and every later tick is dropped.
    pub fn run_cycle(&mut self) -> Result<()> {
        if self.outstanding {
            return Ok(());
        }
        let cycle_start = self.now();
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };

        self.timestamps.cycle_start = cycle_start;
        self.outstanding = true;

        let status_reply = client.transact(&self.status_request)?;
        self.timestamps.status_done = self.now();

        if status_reply.replies.len() != NUM_JOINTS {
            tracing::warn!("missing replies, sz={}", status_reply.replies.len());
            self.outstanding = false;
            return Ok(());
        }

        self.update_status(&status_reply);

        self.control_log = ControlLog::default();
        self.run_control();
        self.timestamps.control_done = self.now();

        if !self.client_command.requests.is_empty() {
            let request = std::mem::take(&mut self.client_command);
            if let Some(client) = self.client.as_mut() {
                let _ = client.transact(&request)?;
            }
        }

        self.outstanding = false;

        let now = self.now();
        self.timestamps.command_done = now;
        self.status.timestamp = now;
        self.status.time_status_s = self.timestamps.status_done - self.timestamps.cycle_start;
        self.status.time_control_s = self.timestamps.control_done - self.timestamps.status_done;
        self.status.time_command_s = self.timestamps.command_done - self.timestamps.control_done;
        self.status.time_cycle_s = self.timestamps.command_done - self.timestamps.cycle_start;

        self.telemetry.status.publish(Arc::new(self.status.clone()));
        Ok(())
    }

    /// Rebuild the snapshot from a full set of status replies
    fn update_status(&mut self, reply: &Reply) {
        let mut ik_joints: Vec<IkJointState> = Vec::with_capacity(NUM_JOINTS);
        let mut links: Vec<LinkState> = Vec::with_capacity(NUM_JOINTS);

        self.status.state.joints.clear();

        for device in &reply.replies {
            let sign = self.sign(device.id);
            let mut joint = JointState {
                id: device.id,
                ..Default::default()
            };

            for (&register, &value) in &device.values {
                match Register::from_u16(register) {
                    Some(Register::Mode) => joint.mode = read_int(value),
                    Some(Register::Position) => joint.angle_deg = sign * read_position(value),
                    Some(Register::Velocity) => joint.velocity_dps = sign * read_velocity(value),
                    Some(Register::Torque) => joint.torque_nm = sign * read_torque(value),
                    Some(Register::Voltage) => joint.voltage = read_voltage(value),
                    Some(Register::Temperature) => {
                        joint.temperature_c = read_temperature(value)
                    }
                    Some(Register::Fault) => joint.fault = read_int(value),
                    _ => {}
                }
            }

            ik_joints.push(IkJointState {
                id: joint.id,
                angle_deg: joint.angle_deg,
                velocity_dps: joint.velocity_dps,
                torque_nm: joint.torque_nm,
            });
            links.push(LinkState {
                id: joint.id,
                angle_deg: joint.angle_deg,
                velocity_dps: joint.velocity_dps,
                torque_nm: joint.torque_nm,
            });
            self.status.state.joints.push(joint);
        }

        let get_link = |id: u8| -> LinkState {
            links
                .iter()
                .find(|l| l.id == id)
                .copied()
                .unwrap_or_else(|| unreachable!("link for joint id {} missing", id))
        };

        self.status.state.legs_b.clear();
        for leg in &self.legs {
            let effector = leg.ik.forward(&ik_joints);
            self.status.state.legs_b.push(LegState {
                leg: leg.leg,
                position_mm: leg.pose_mm_bg.transform_point(effector.pose_mm_g),
                velocity_mm_s: leg.pose_mm_bg.transform_vector(effector.velocity_mm_s_g),
                force_n: leg.pose_mm_bg.transform_vector(effector.force_n_g),
                links: vec![
                    get_link(leg.config.ik.shoulder.id),
                    get_link(leg.config.ik.femur.id),
                    get_link(leg.config.ik.tibia.id),
                ],
            });
        }
    }

    fn run_control(&mut self) {
        if let Some(requested) = self.current_command.as_ref().map(|c| c.mode) {
            if requested != self.status.mode {
                self.maybe_change_mode(requested);
            }
        }

        match self.status.mode {
            Mode::Stopped => self.do_control_stopped(),
            Mode::Fault => self.do_control_fault(),
            Mode::ZeroVelocity => self.do_control_zero_velocity(),
            Mode::Joint => self.do_control_joint(),
            Mode::Leg => self.do_control_leg(),
            Mode::StandUp => self.do_control_stand_up(),
        }
    }

    /// Apply the transition table. Denied requests change nothing, silently.
    fn maybe_change_mode(&mut self, requested: Mode) {
        let old_mode = self.status.mode;
        match requested {
            // Fault can only be entered by the engine itself.
            Mode::Fault => return,
            // Always valid (although not always a good idea).
            Mode::Stopped => {
                self.status.mode = Mode::Stopped;
            }
            Mode::ZeroVelocity | Mode::Joint | Mode::Leg => {
                if self.status.mode == Mode::Fault {
                    return;
                }
                self.status.mode = requested;
            }
            Mode::StandUp => {
                if self.status.mode != Mode::Stopped {
                    return;
                }
                self.status.mode = requested;
                // Starting over: the submachine begins at prepositioning.
                self.status.state.stand_up = Default::default();
            }
        }

        if self.status.mode != old_mode {
            self.status.mode_start = self.now();
            tracing::debug!("mode {:?} -> {:?}", old_mode, self.status.mode);
        }
    }

    /// Enter Fault with a message and hold position immediately
    pub fn fault(&mut self, message: impl Into<String>) {
        self.status.mode = Mode::Fault;
        self.status.fault = message.into();
        self.status.mode_start = self.now();
        tracing::warn!("fault: {}", self.status.fault);

        self.do_control_fault();
    }

    fn do_control_stopped(&mut self) {
        let out_joints = self
            .config
            .joints
            .iter()
            .map(|joint| JointCommand {
                id: joint.id,
                power: false,
                ..Default::default()
            })
            .collect();
        self.control_joints(out_joints);
    }

    fn do_control_fault(&mut self) {
        // A faulted robot actively holds position.
        self.do_control_zero_velocity();
    }

    fn do_control_zero_velocity(&mut self) {
        let out_joints = self
            .config
            .joints
            .iter()
            .map(|joint| JointCommand {
                id: joint.id,
                power: true,
                zero_velocity: true,
                ..Default::default()
            })
            .collect();
        self.control_joints(out_joints);
    }

    fn do_control_joint(&mut self) {
        match &self.current_command {
            Some(command) => {
                let joints = command.joints.clone();
                self.control_joints(joints);
            }
            // No command yet is equivalent to Stopped.
            None => self.do_control_stopped(),
        }
    }

    fn do_control_leg(&mut self) {
        match &self.current_command {
            Some(command) if !command.legs_r.is_empty() => {
                let legs_r = command.legs_r.clone();
                self.control_legs_r(legs_r);
            }
            Some(command) => {
                let legs_b = command.legs_b.clone();
                self.control_legs_b(legs_b);
            }
            None => self.do_control_stopped(),
        }
    }

    /// Robot-frame leg control: transform into body frame and delegate
    fn control_legs_r(&mut self, legs_r: Vec<LegCommand>) {
        let pose_mm_br = self.status.state.robot.pose_mm_rb.inverse();

        let legs_b = legs_r
            .iter()
            .map(|leg_r| LegCommand {
                position_mm: pose_mm_br.transform_point(leg_r.position_mm),
                velocity_mm_s: pose_mm_br.transform_vector(leg_r.velocity_mm_s),
                force_n: pose_mm_br.transform_vector(leg_r.force_n),
                ..*leg_r
            })
            .collect();

        self.control_log.legs_r = legs_r;
        self.control_legs_b(legs_b);
    }

    /// Body-frame leg control: per-leg inverse kinematics
    fn control_legs_b(&mut self, legs_b: Vec<LegCommand>) {
        let current_joints: Vec<IkJointState> = self
            .status
            .state
            .joints
            .iter()
            .map(|joint| IkJointState {
                id: joint.id,
                angle_deg: joint.angle_deg,
                velocity_dps: joint.velocity_dps,
                torque_nm: joint.torque_nm,
            })
            .collect();

        let mut out_joints = Vec::with_capacity(3 * legs_b.len());

        for leg_b in &legs_b {
            let leg = self.get_leg(leg_b.leg);
            let chain_ids = leg.ik.joint_ids();

            let hold = |template: JointCommand, out: &mut Vec<JointCommand>| {
                for id in chain_ids {
                    out.push(JointCommand { id, ..template });
                }
            };

            if !leg_b.power {
                hold(
                    JointCommand {
                        power: false,
                        ..Default::default()
                    },
                    &mut out_joints,
                );
            } else if leg_b.zero_velocity {
                hold(
                    JointCommand {
                        power: true,
                        zero_velocity: true,
                        ..Default::default()
                    },
                    &mut out_joints,
                );
            } else {
                let pose_mm_gb = leg.pose_mm_bg.inverse();
                let effector = Effector {
                    pose_mm_g: pose_mm_gb.transform_point(leg_b.position_mm),
                    velocity_mm_s_g: pose_mm_gb.transform_vector(leg_b.velocity_mm_s),
                    force_n_g: pose_mm_gb.transform_vector(leg_b.force_n),
                };

                match leg.ik.inverse(&effector, &current_joints) {
                    None => {
                        // Unreachable or singular: hold this leg at zero
                        // velocity for the cycle.
                        hold(
                            JointCommand {
                                power: true,
                                zero_velocity: true,
                                ..Default::default()
                            },
                            &mut out_joints,
                        );
                    }
                    Some(solution) => {
                        for joint in solution {
                            out_joints.push(JointCommand {
                                id: joint.id,
                                power: true,
                                angle_deg: joint.angle_deg,
                                velocity_dps: joint.velocity_dps,
                                torque_nm: joint.torque_nm,
                                // TODO: propagate kp and kd from 3D into joints.
                                kp_scale: leg_b.kp_scale.map(|v| v.x),
                                kd_scale: leg_b.kd_scale.map(|v| v.x),
                                ..Default::default()
                            });
                        }
                    }
                }
            }
        }

        self.control_log.legs_b = legs_b;
        self.control_joints(out_joints);
    }

    fn do_control_stand_up(&mut self) {
        let elapsed_s = self.now() - self.status.mode_start;
        if elapsed_s > self.config.stand_up.timeout_s {
            self.fault("timeout");
            return;
        }

        // See if we can advance to the next state.
        match self.status.state.stand_up.mode {
            StandUpMode::Prepositioning => {
                if self.check_prepositioning() {
                    self.status.state.stand_up.mode = StandUpMode::Standing;
                }
            }
            StandUpMode::Standing => {
                let target = self
                    .current_command
                    .as_ref()
                    .map(|c| c.stand_up_pose_mm_sr)
                    .unwrap_or_default();
                let error_mm = self
                    .status
                    .state
                    .robot
                    .pose_mm_sr
                    .translation_distance(&target);
                if error_mm < self.config.stand_up.tolerance_mm {
                    self.status.state.stand_up.mode = StandUpMode::Done;
                }
            }
            StandUpMode::Done => {}
        }

        // Now execute our control.
        match self.status.state.stand_up.mode {
            StandUpMode::Prepositioning => self.do_control_stand_up_prepositioning(),
            StandUpMode::Standing | StandUpMode::Done => self.do_control_stand_up_standing(),
        }
    }

    /// All joints within tolerance of the preposition pose?
    fn check_prepositioning(&self) -> bool {
        let current_deg: HashMap<u8, f64> = self
            .status
            .state
            .joints
            .iter()
            .map(|j| (j.id, j.angle_deg))
            .collect();

        let pose = &self.config.stand_up.pose;
        let tolerance = self.config.stand_up.tolerance_deg;

        self.legs.iter().all(|leg| {
            [
                (leg.config.ik.shoulder.id, pose.shoulder_deg),
                (leg.config.ik.femur.id, pose.femur_deg),
                (leg.config.ik.tibia.id, pose.tibia_deg),
            ]
            .into_iter()
            .all(|(id, expected_deg)| {
                let current = current_deg
                    .get(&id)
                    .copied()
                    .unwrap_or_else(|| unreachable!("joint id {} missing from snapshot", id));
                (current - expected_deg).abs() <= tolerance
            })
        })
    }

    fn do_control_stand_up_prepositioning(&mut self) {
        let stand_up = &self.config.stand_up;
        let mut joints = Vec::with_capacity(NUM_JOINTS);

        for leg in &self.legs {
            let base = JointCommand {
                power: true,
                // The angle stays free; the joint slews against the stop.
                angle_deg: f64::NAN,
                velocity_dps: stand_up.velocity_dps,
                max_torque_nm: Some(stand_up.max_preposition_torque_nm),
                ..Default::default()
            };

            for (id, stop_angle_deg) in [
                (leg.config.ik.shoulder.id, stand_up.pose.shoulder_deg),
                (leg.config.ik.femur.id, stand_up.pose.femur_deg),
                (leg.config.ik.tibia.id, stand_up.pose.tibia_deg),
            ] {
                joints.push(JointCommand {
                    id,
                    stop_angle_deg: Some(stop_angle_deg),
                    ..base
                });
            }
        }

        self.control_joints(joints);
    }

    fn do_control_stand_up_standing(&mut self) {
        self.fault("not implemented");
    }

    fn control_joints(&mut self, joints: Vec<JointCommand>) {
        self.control_log.joints = joints;
        self.emit_control();
    }

    /// Publish the control log and encode it into the command transaction
    fn emit_control(&mut self) {
        self.control_log.timestamp = self.now();
        self.telemetry
            .control
            .publish(Arc::new(self.control_log.clone()));

        self.client_command = Request::default();
        for joint in &self.control_log.joints {
            let mode = if !joint.power {
                ServoMode::Stopped
            } else if joint.zero_velocity {
                ServoMode::PositionTimeout
            } else {
                ServoMode::Position
            };

            let sign = self.sign(joint.id);
            let write = PositionWrite {
                angle_deg: sign * joint.angle_deg,
                velocity_dps: sign * joint.velocity_dps,
                torque_nm: sign * joint.torque_nm,
                kp_scale: joint.kp_scale,
                kd_scale: joint.kd_scale,
                max_torque_nm: joint.max_torque_nm,
                stop_angle_deg: joint.stop_angle_deg.map(|a| sign * a),
            };

            self.client_command
                .requests
                .push(command_frame(joint.id, mode, Some(&write)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{write_pwm, write_torque, write_velocity, write_position, MockClient};
    use crate::config::test_fixtures::test_config;
    use crate::math::Vector3;
    use approx::assert_relative_eq;

    const REG_CMD_POSITION: u16 = 0x020;
    const REG_CMD_VELOCITY: u16 = 0x021;
    const REG_CMD_KP: u16 = 0x023;
    const REG_CMD_MAX_TORQUE: u16 = 0x025;
    const REG_CMD_STOP_ANGLE: u16 = 0x026;

    fn engine_with_mock() -> (QuadrupedEngine, MockClient) {
        let client = MockClient::new();
        let mut engine = QuadrupedEngine::new(test_config(), Parameters::default()).unwrap();
        engine.set_client(Box::new(client.clone()));
        (engine, client)
    }

    fn mode_command(mode: Mode) -> QuadrupedCommand {
        QuadrupedCommand {
            mode,
            ..Default::default()
        }
    }

    /// Chain targets by joint id for the fixture config, in config order.
    fn stand_up_targets(config: &Config) -> Vec<(u8, f64)> {
        let pose = &config.stand_up.pose;
        config
            .legs
            .iter()
            .flat_map(|leg| {
                [
                    (leg.ik.shoulder.id, pose.shoulder_deg),
                    (leg.ik.femur.id, pose.femur_deg),
                    (leg.ik.tibia.id, pose.tibia_deg),
                ]
            })
            .collect()
    }

    #[test]
    fn test_bring_up() {
        let (mut engine, client) = engine_with_mock();
        let status_rx = engine.telemetry().status.subscribe();

        engine.run_cycle().unwrap();

        let status = engine.status();
        assert_eq!(status.mode, Mode::Stopped);
        assert_eq!(status.state.joints.len(), 12);
        assert_eq!(status.state.legs_b.len(), 4);
        for leg in &status.state.legs_b {
            assert_eq!(leg.links.len(), 3);
        }
        assert!(status.time_cycle_s >= 0.0);
        assert!(!engine.outstanding());

        // Every frame in Stopped carries mode register == Stopped, nothing
        // else.
        for joint in &test_config().joints {
            assert_eq!(client.raw(joint.id, Register::Mode), 0);
            assert_eq!(client.raw_at(joint.id, REG_CMD_POSITION), 0);
        }

        let published = status_rx.latest().expect("status not published");
        assert_eq!(published.state.joints.len(), 12);
    }

    #[test]
    fn test_no_client_drops_tick() {
        let mut engine = QuadrupedEngine::new(test_config(), Parameters::default()).unwrap();
        engine.run_cycle().unwrap();
        assert!(engine.status().state.joints.is_empty());
        assert!(!engine.outstanding());
    }

    #[test]
    fn test_zero_velocity_frames() {
        let (mut engine, client) = engine_with_mock();
        engine.command(mode_command(Mode::ZeroVelocity));
        engine.run_cycle().unwrap();

        assert_eq!(engine.status().mode, Mode::ZeroVelocity);
        for joint in &test_config().joints {
            assert_eq!(client.raw(joint.id, Register::Mode), 11);
        }
    }

    #[test]
    fn test_sign_applied_twice_is_identity() {
        let (mut engine, client) = engine_with_mock();
        // Joint 2 has sign -1 in the fixture. 2500 raw == 90 deg on the
        // wire.
        client.set_raw(2, Register::Position, 2500);
        engine.run_cycle().unwrap();

        let decoded = engine
            .status()
            .state
            .joints
            .iter()
            .find(|j| j.id == 2)
            .unwrap()
            .angle_deg;
        assert_relative_eq!(decoded, -90.0);

        // Command that same decoded angle back out: the wire value returns.
        engine.command(QuadrupedCommand {
            mode: Mode::Joint,
            joints: vec![JointCommand {
                id: 2,
                power: true,
                angle_deg: decoded,
                ..Default::default()
            }],
            ..Default::default()
        });
        engine.run_cycle().unwrap();
        assert_eq!(client.raw_at(2, REG_CMD_POSITION), 2500);
    }

    #[test]
    fn test_operator_cannot_request_fault() {
        let (mut engine, _client) = engine_with_mock();
        let mode_start = engine.status().mode_start;

        engine.command(mode_command(Mode::Fault));
        engine.run_cycle().unwrap();

        assert_eq!(engine.status().mode, Mode::Stopped);
        assert_eq!(engine.status().mode_start, mode_start);
    }

    #[test]
    fn test_standup_only_from_stopped() {
        let (mut engine, _client) = engine_with_mock();
        engine.command(mode_command(Mode::Joint));
        engine.run_cycle().unwrap();
        assert_eq!(engine.status().mode, Mode::Joint);

        let mode_start = engine.status().mode_start;
        engine.command(mode_command(Mode::StandUp));
        engine.run_cycle().unwrap();
        assert_eq!(engine.status().mode, Mode::Joint);
        assert_eq!(engine.status().mode_start, mode_start);
    }

    #[test]
    fn test_fault_denies_all_but_stopped() {
        let (mut engine, client) = engine_with_mock();
        engine.fault("test fault");
        assert_eq!(engine.status().mode, Mode::Fault);
        let mode_start = engine.status().mode_start;

        for denied in [Mode::Joint, Mode::Leg, Mode::ZeroVelocity, Mode::StandUp] {
            engine.command(mode_command(denied));
            engine.run_cycle().unwrap();
            assert_eq!(engine.status().mode, Mode::Fault);
            assert_eq!(engine.status().mode_start, mode_start);
        }

        // A faulted robot actively holds position.
        for joint in &test_config().joints {
            assert_eq!(client.raw(joint.id, Register::Mode), 11);
        }

        engine.command(mode_command(Mode::Stopped));
        engine.run_cycle().unwrap();
        assert_eq!(engine.status().mode, Mode::Stopped);
        assert!(engine.status().mode_start > mode_start);
    }

    #[test]
    fn test_standup_preposition_frames() {
        let (mut engine, client) = engine_with_mock();
        let config = test_config();

        engine.command(mode_command(Mode::StandUp));
        engine.run_cycle().unwrap();

        assert_eq!(engine.status().mode, Mode::StandUp);
        assert_eq!(
            engine.status().state.stand_up.mode,
            StandUpMode::Prepositioning
        );

        for (id, target_deg) in stand_up_targets(&config) {
            let sign = config.sign(id);
            assert_eq!(client.raw(id, Register::Mode), 10);
            // Angle left free, slewing against the stop angle instead.
            assert_eq!(client.raw_at(id, REG_CMD_POSITION), i16::MIN as i32);
            assert_eq!(
                client.raw_at(id, REG_CMD_VELOCITY),
                write_velocity(sign * 30.0).raw()
            );
            assert_eq!(
                client.raw_at(id, REG_CMD_MAX_TORQUE),
                write_torque(3.0).raw()
            );
            assert_eq!(
                client.raw_at(id, REG_CMD_STOP_ANGLE),
                write_position(sign * target_deg).raw()
            );
        }
    }

    #[test]
    fn test_standup_advances_then_standing_faults() {
        let (mut engine, client) = engine_with_mock();
        let config = test_config();

        engine.command(mode_command(Mode::StandUp));
        engine.run_cycle().unwrap();
        assert_eq!(
            engine.status().state.stand_up.mode,
            StandUpMode::Prepositioning
        );

        // Joints arrive at the preposition pose (to wire precision).
        for (id, target_deg) in stand_up_targets(&config) {
            let sign = config.sign(id);
            client.set_raw(
                id,
                Register::Position,
                write_position(sign * target_deg).raw(),
            );
        }

        engine.run_cycle().unwrap();
        assert_eq!(engine.status().state.stand_up.mode, StandUpMode::Standing);
        // The standing controller is a known stub.
        assert_eq!(engine.status().mode, Mode::Fault);
        assert_eq!(engine.status().fault, "not implemented");
    }

    #[test]
    fn test_standup_timeout_faults() {
        let client = MockClient::new();
        let mut config = test_config();
        config.stand_up.timeout_s = 0.0;
        let mut engine = QuadrupedEngine::new(config, Parameters::default()).unwrap();
        engine.set_client(Box::new(client.clone()));

        engine.command(mode_command(Mode::StandUp));
        engine.run_cycle().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        engine.run_cycle().unwrap();

        assert_eq!(engine.status().mode, Mode::Fault);
        assert_eq!(engine.status().fault, "timeout");
    }

    #[test]
    fn test_short_telemetry_skips_cycle() {
        let (mut engine, client) = engine_with_mock();
        client.silence(7, true);

        engine.run_cycle().unwrap();

        // Status read went out, but no snapshot, no command write.
        assert_eq!(client.transaction_count(), 1);
        assert!(engine.status().state.joints.is_empty());
        assert!(!engine.outstanding());

        // The next tick starts cleanly.
        client.silence(7, false);
        engine.run_cycle().unwrap();
        assert_eq!(client.transaction_count(), 3);
        assert_eq!(engine.status().state.joints.len(), 12);
    }

    #[test]
    fn test_transport_error_is_fatal() {
        let (mut engine, client) = engine_with_mock();
        client.fail_next("bus gone");

        let err = engine.run_cycle().unwrap_err();
        assert!(err.to_string().contains("bus gone"));
        assert!(engine.outstanding());

        // The engine does not continue: later ticks are dropped.
        engine.run_cycle().unwrap();
        assert_eq!(client.transaction_count(), 1);
    }

    #[test]
    fn test_leg_ik_failure_falls_back_to_zero_velocity() {
        let (mut engine, client) = engine_with_mock();

        engine.command(QuadrupedCommand {
            mode: Mode::Leg,
            legs_b: vec![LegCommand {
                leg: 0,
                power: true,
                // Far outside the leg's reach.
                position_mm: Vector3::new(150.0, 125.0, -900.0),
                ..Default::default()
            }],
            ..Default::default()
        });
        engine.run_cycle().unwrap();

        let last = client.last_request().unwrap();
        assert_eq!(last.requests.len(), 3);
        for id in [1u8, 2, 3] {
            assert_eq!(client.raw(id, Register::Mode), 11);
        }
    }

    #[test]
    fn test_leg_unpowered_command_stops_chain() {
        let (mut engine, client) = engine_with_mock();

        engine.command(QuadrupedCommand {
            mode: Mode::Leg,
            legs_b: vec![LegCommand {
                leg: 1,
                power: false,
                ..Default::default()
            }],
            ..Default::default()
        });
        engine.run_cycle().unwrap();

        for id in [4u8, 5, 6] {
            assert_eq!(client.raw(id, Register::Mode), 0);
        }
    }

    #[test]
    fn test_leg_mode_reachable_target_roundtrip() {
        let (mut engine, client) = engine_with_mock();
        let config = test_config();

        // Work with leg 0 (ids 1, 2, 3). Pick chain angles, derive the
        // body-frame target from forward kinematics.
        let leg_config = &config.legs[0];
        let ik = MammalIk::new(leg_config.ik);
        let chain_angles = [10.0, 40.0, -70.0];
        let chain_states: Vec<IkJointState> = [1u8, 2, 3]
            .iter()
            .zip(chain_angles)
            .map(|(&id, angle_deg)| IkJointState {
                id,
                angle_deg,
                ..Default::default()
            })
            .collect();
        let target_b = leg_config
            .pose_mm_bg
            .transform_point(ik.forward(&chain_states).pose_mm_g);

        // Put the chain near (not at) the target so branch selection has
        // something realistic to work with.
        for (&id, angle_deg) in [1u8, 2, 3].iter().zip([5.0, 30.0, -60.0]) {
            let sign = config.sign(id);
            client.set_raw(id, Register::Position, write_position(sign * angle_deg).raw());
        }

        engine.command(QuadrupedCommand {
            mode: Mode::Leg,
            legs_b: vec![LegCommand {
                leg: 0,
                power: true,
                position_mm: target_b,
                kp_scale: Some(Vector3::new(0.5, 0.9, 0.9)),
                ..Default::default()
            }],
            ..Default::default()
        });
        engine.run_cycle().unwrap();

        // Decode the emitted angles and push them back through forward
        // kinematics: the commanded effector position comes back, within
        // wire quantization.
        let emitted: Vec<IkJointState> = [1u8, 2, 3]
            .iter()
            .map(|&id| {
                assert_eq!(client.raw(id, Register::Mode), 10);
                let raw = client.raw_at(id, REG_CMD_POSITION);
                let sign = config.sign(id);
                IkJointState {
                    id,
                    angle_deg: sign * crate::bus::read_position(crate::bus::Value::Int16(raw as i16)),
                    ..Default::default()
                }
            })
            .collect();

        let reproduced_b = leg_config
            .pose_mm_bg
            .transform_point(ik.forward(&emitted).pose_mm_g);
        assert!((reproduced_b - target_b).norm() < 0.5);

        // kp propagates from the X component only; kd stays default.
        for id in [1u8, 2, 3] {
            assert_eq!(client.raw_at(id, REG_CMD_KP), write_pwm(0.5).raw());
        }
    }

    #[test]
    fn test_telemetry_emission_order_and_copies() {
        let (mut engine, _client) = engine_with_mock();
        let command_rx = engine.telemetry().command.subscribe();
        let control_rx = engine.telemetry().control.subscribe();
        let status_rx = engine.telemetry().status.subscribe();

        engine.command(mode_command(Mode::ZeroVelocity));
        // Command log is published on ingress, before any cycle runs.
        let command_log = command_rx.latest().expect("command log not published");
        assert_eq!(command_log.command.mode, Mode::ZeroVelocity);
        assert!(control_rx.is_empty());
        assert!(status_rx.is_empty());

        engine.run_cycle().unwrap();
        let control_log = control_rx.latest().expect("control log not published");
        assert_eq!(control_log.joints.len(), 12);
        assert!(control_log.joints.iter().all(|j| j.zero_velocity));
        let status = status_rx.latest().expect("status not published");
        assert_eq!(status.mode, Mode::ZeroVelocity);
    }
}
