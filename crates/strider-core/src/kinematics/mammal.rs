//! Analytic kinematics for a mammal-style leg
//!
//! The chain, all in the leg geometry frame G (x forward, y left, z up):
//!
//! ```text
//! G ──sh.pose_mm──► shoulder (roll, +X) ──fe.pose_mm──► femur (pitch, +Y)
//!   ──ti.pose_mm──► tibia (pitch, +Y, relative to femur) ──foot_mm──► foot
//! ```
//!
//! Forward is total: any joint-angle triple maps to a foot pose, velocity
//! (geometric Jacobian), and force estimate. Inverse is the closed-form
//! solution and returns `None` for unreachable or singular targets; it
//! assumes the canonical structure (lateral femur offset along +Y, link
//! lengths along -Z at the zero pose) that the forward chain generalizes.

use nalgebra::Matrix3;

use crate::config::MammalIkConfig;
use crate::math::{deg_to_rad, normalize_angle, rad_to_deg, Vector3};

/// One joint's contribution to a kinematics query, tagged by bus id
#[derive(Debug, Clone, Copy, Default)]
pub struct IkJointState {
    pub id: u8,
    pub angle_deg: f64,
    pub velocity_dps: f64,
    pub torque_nm: f64,
}

/// Foot state in the leg geometry frame
#[derive(Debug, Clone, Copy, Default)]
pub struct Effector {
    /// Foot position (millimetres)
    pub pose_mm_g: Vector3,
    /// Foot linear velocity (millimetres/second)
    pub velocity_mm_s_g: Vector3,
    /// Foot force (newtons)
    pub force_n_g: Vector3,
}

/// One joint command produced by the inverse solution
#[derive(Debug, Clone, Copy, Default)]
pub struct IkOutput {
    pub id: u8,
    pub angle_deg: f64,
    pub velocity_dps: f64,
    pub torque_nm: f64,
}

fn rot_x(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

fn rot_y(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

fn drot_x(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(0.0, 0.0, 0.0, 0.0, -s, -c, 0.0, c, -s)
}

fn drot_y(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(-s, 0.0, c, 0.0, 0.0, 0.0, -c, 0.0, -s)
}

/// Closed-form kinematics for one leg
#[derive(Debug, Clone)]
pub struct MammalIk {
    config: MammalIkConfig,
}

impl MammalIk {
    pub fn new(config: MammalIkConfig) -> Self {
        Self { config }
    }

    /// The bus ids of this chain in shoulder-femur-tibia order
    pub fn joint_ids(&self) -> [u8; 3] {
        [
            self.config.shoulder.id,
            self.config.femur.id,
            self.config.tibia.id,
        ]
    }

    fn chain_states(&self, joints: &[IkJointState]) -> [IkJointState; 3] {
        let find = |id: u8| -> IkJointState {
            joints
                .iter()
                .find(|j| j.id == id)
                .copied()
                .unwrap_or_else(|| unreachable!("joint id {} missing from kinematics input", id))
        };
        [
            find(self.config.shoulder.id),
            find(self.config.femur.id),
            find(self.config.tibia.id),
        ]
    }

    /// Foot position for the given chain angles (radians)
    fn chain_position(&self, a_s: f64, a_f: f64, a_t: f64) -> Vector3 {
        let inner = self.config.tibia.pose_mm + rot_y(a_t) * self.config.foot_mm;
        let upper = self.config.femur.pose_mm + rot_y(a_f) * inner;
        self.config.shoulder.pose_mm + rot_x(a_s) * upper
    }

    /// Geometric Jacobian, millimetres per radian, columns in
    /// shoulder-femur-tibia order
    fn jacobian(&self, a_s: f64, a_f: f64, a_t: f64) -> Matrix3<f64> {
        let inner = self.config.tibia.pose_mm + rot_y(a_t) * self.config.foot_mm;
        let upper = self.config.femur.pose_mm + rot_y(a_f) * inner;

        let col_s = drot_x(a_s) * upper;
        let col_f = rot_x(a_s) * (drot_y(a_f) * inner);
        let col_t = rot_x(a_s) * (rot_y(a_f) * (drot_y(a_t) * self.config.foot_mm));

        Matrix3::from_columns(&[col_s, col_f, col_t])
    }

    /// Forward kinematics: chain angles to foot pose, velocity, and force
    ///
    /// `joints` may carry the whole robot; the chain picks out its three
    /// ids. Force is recovered from joint torques through the transposed
    /// Jacobian and falls back to zero at singular poses.
    pub fn forward(&self, joints: &[IkJointState]) -> Effector {
        let [shoulder, femur, tibia] = self.chain_states(joints);

        let a_s = deg_to_rad(shoulder.angle_deg);
        let a_f = deg_to_rad(femur.angle_deg);
        let a_t = deg_to_rad(tibia.angle_deg);

        let pose_mm_g = self.chain_position(a_s, a_f, a_t);

        let jac = self.jacobian(a_s, a_f, a_t);
        let qdot = Vector3::new(
            deg_to_rad(shoulder.velocity_dps),
            deg_to_rad(femur.velocity_dps),
            deg_to_rad(tibia.velocity_dps),
        );
        let velocity_mm_s_g = jac * qdot;

        // tau = (J/1000)^T * F, so F = (J/1000)^-T * tau
        let tau = Vector3::new(shoulder.torque_nm, femur.torque_nm, tibia.torque_nm);
        let force_n_g = match (jac / 1000.0).transpose().try_inverse() {
            Some(inv) => inv * tau,
            None => Vector3::zeros(),
        };

        Effector {
            pose_mm_g,
            velocity_mm_s_g,
            force_n_g,
        }
    }

    /// Inverse kinematics: desired foot state to three joint commands
    ///
    /// Returns `None` when the target is out of reach or the solution pose
    /// is singular. `current` selects among the solution branches: the
    /// shoulder candidate nearer the present shoulder angle wins, and the
    /// knee bends the way it is already bent.
    pub fn inverse(&self, effector: &Effector, current: &[IkJointState]) -> Option<[IkOutput; 3]> {
        let [cur_shoulder, _cur_femur, cur_tibia] = self.chain_states(current);

        let l1 = self.config.tibia.pose_mm.norm();
        let l2 = self.config.foot_mm.norm();
        if l1 <= 0.0 || l2 <= 0.0 {
            return None;
        }
        let y0 = self.config.femur.pose_mm.y;

        let p = effector.pose_mm_g - self.config.shoulder.pose_mm;

        // Shoulder roll: rotate the target into the leg plane (y == y0).
        let r = (p.y * p.y + p.z * p.z).sqrt();
        if r < y0.abs() {
            return None;
        }
        let phi = p.z.atan2(p.y);
        let spread = (y0 / r).clamp(-1.0, 1.0).acos();
        let cur = deg_to_rad(cur_shoulder.angle_deg);
        let a_s = [phi + spread, phi - spread]
            .into_iter()
            .min_by(|a, b| {
                normalize_angle(a - cur)
                    .abs()
                    .partial_cmp(&normalize_angle(b - cur).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        // Keep the commanded roll continuous with the present one.
        let a_s = cur + normalize_angle(a_s - cur);

        // Planar coordinates in the leg plane after undoing the roll.
        let qx = p.x;
        let qz = -p.y * a_s.sin() + p.z * a_s.cos();

        // Knee from the law of cosines.
        let d_sq = qx * qx + qz * qz;
        let cos_knee = (d_sq - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
        if !(-1.0..=1.0).contains(&cos_knee) {
            return None;
        }
        let bend = if deg_to_rad(cur_tibia.angle_deg) < 0.0 {
            -1.0
        } else {
            1.0
        };
        let a_t = bend * cos_knee.acos();

        // Femur pitch: angles measured from -Z, positive toward +X;
        // Ry(theta) maps an angle psi to psi - theta.
        let psi_inner = (-l2 * a_t.sin()).atan2(l1 + l2 * a_t.cos());
        let psi_q = qx.atan2(-qz);
        let a_f = normalize_angle(psi_inner - psi_q);

        let jac = self.jacobian(a_s, a_f, a_t);
        // Scale-relative conditioning guard: near full extension or full
        // fold the Jacobian collapses and inverting it would command
        // runaway joint rates.
        if jac.determinant().abs() < 1e-6 * l1 * l2 * (l1 + l2) {
            return None;
        }
        let jac_inv = jac.try_inverse()?;

        let qdot = jac_inv * effector.velocity_mm_s_g; // rad/s
        let tau = (jac / 1000.0).transpose() * effector.force_n_g;

        let ids = self.joint_ids();
        let angles = [a_s, a_f, a_t];
        let mut out = [IkOutput::default(); 3];
        for i in 0..3 {
            out[i] = IkOutput {
                id: ids[i],
                angle_deg: rad_to_deg(angles[i]),
                velocity_dps: rad_to_deg(qdot[i]),
                torque_nm: tau[i],
            };
        }
        Some(out)
    }
}
