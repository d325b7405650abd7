//! Robot geometry and stand-up configuration
//!
//! A JSON document describing the twelve joints, the four legs (each with a
//! rigid transform from its geometry frame G to the body frame B and its IK
//! geometry), and the stand-up motion profile. Missing fields take the
//! defaults below; extra fields are ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::math::{Transform, Vector3};
use crate::{Error, Result};

/// Number of legs a valid configuration must describe
pub const NUM_LEGS: usize = 4;
/// Number of joints a valid configuration must describe
pub const NUM_JOINTS: usize = 12;

fn default_sign() -> f64 {
    1.0
}

fn default_min_deg() -> f64 {
    -360.0
}

fn default_max_deg() -> f64 {
    360.0
}

/// A single servo joint
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointConfig {
    /// Bus id of the servo
    pub id: u8,
    /// Direction convention: decoded quantities are multiplied by this, and
    /// outgoing commands are multiplied by it again before encoding, so the
    /// engine-side representation is mounting-independent
    #[serde(default = "default_sign")]
    pub sign: f64,
    /// Minimum allowed angle (degrees)
    #[serde(default = "default_min_deg")]
    pub min_deg: f64,
    /// Maximum allowed angle (degrees)
    #[serde(default = "default_max_deg")]
    pub max_deg: f64,
}

fn zero_vec() -> Vector3 {
    Vector3::zeros()
}

/// One joint of a leg's kinematic chain
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IkJointConfig {
    /// Bus id of the servo driving this chain joint
    pub id: u8,
    /// Fixed offset to this joint's pivot from the previous chain frame, at
    /// the zero pose (millimetres)
    #[serde(default = "zero_vec")]
    pub pose_mm: Vector3,
}

/// Geometry of a mammal-style 3-DoF leg
///
/// The chain is shoulder (roll about +X), femur (pitch about +Y), tibia
/// (pitch about +Y, relative to the femur), all expressed in the leg
/// geometry frame G.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MammalIkConfig {
    pub shoulder: IkJointConfig,
    pub femur: IkJointConfig,
    pub tibia: IkJointConfig,
    /// Offset from the tibia pivot to the foot at the zero pose
    /// (millimetres)
    #[serde(default = "zero_vec")]
    pub foot_mm: Vector3,
}

/// A single leg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegConfig {
    /// Leg id, unique across the robot
    pub leg: u8,
    /// Rigid transform mapping leg geometry frame G into body frame B
    #[serde(rename = "pose_mm_BG", default)]
    pub pose_mm_bg: Transform,
    /// Kinematic chain geometry
    pub ik: MammalIkConfig,
}

fn default_femur_deg() -> f64 {
    135.0
}

fn default_tibia_deg() -> f64 {
    -120.0
}

/// The joint-space pose each leg slews to before standing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MammalJointPose {
    #[serde(default)]
    pub shoulder_deg: f64,
    #[serde(default = "default_femur_deg")]
    pub femur_deg: f64,
    #[serde(default = "default_tibia_deg")]
    pub tibia_deg: f64,
}

impl Default for MammalJointPose {
    fn default() -> Self {
        Self {
            shoulder_deg: 0.0,
            femur_deg: default_femur_deg(),
            tibia_deg: default_tibia_deg(),
        }
    }
}

fn default_velocity_dps() -> f64 {
    30.0
}

fn default_max_preposition_torque_nm() -> f64 {
    3.0
}

fn default_timeout_s() -> f64 {
    4.0
}

fn default_tolerance_deg() -> f64 {
    1.0
}

fn default_tolerance_mm() -> f64 {
    10.0
}

fn default_velocity_mm_s() -> f64 {
    100.0
}

/// Stand-up motion profile
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StandUpConfig {
    /// Joint-space preposition target
    #[serde(default)]
    pub pose: MammalJointPose,
    /// Slew rate during prepositioning (degrees/second)
    #[serde(default = "default_velocity_dps")]
    pub velocity_dps: f64,
    /// Torque ceiling during prepositioning (N·m)
    #[serde(default = "default_max_preposition_torque_nm")]
    pub max_preposition_torque_nm: f64,
    /// Whole-sequence timeout; exceeding it faults the engine (seconds)
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
    /// Per-joint tolerance for preposition completion (degrees)
    #[serde(default = "default_tolerance_deg")]
    pub tolerance_deg: f64,
    /// Translation tolerance for standing completion (millimetres)
    #[serde(default = "default_tolerance_mm")]
    pub tolerance_mm: f64,
    /// Body slew rate while standing (millimetres/second)
    #[serde(default = "default_velocity_mm_s")]
    pub velocity_mm_s: f64,
}

impl Default for StandUpConfig {
    fn default() -> Self {
        Self {
            pose: MammalJointPose::default(),
            velocity_dps: default_velocity_dps(),
            max_preposition_torque_nm: default_max_preposition_torque_nm(),
            timeout_s: default_timeout_s(),
            tolerance_deg: default_tolerance_deg(),
            tolerance_mm: default_tolerance_mm(),
            velocity_mm_s: default_velocity_mm_s(),
        }
    }
}

/// Whole-robot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub joints: Vec<JointConfig>,
    #[serde(default)]
    pub legs: Vec<LegConfig>,
    #[serde(default)]
    pub stand_up: StandUpConfig,
}

impl Config {
    /// Load and validate a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("could not open config file '{}': {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate a configuration from a JSON string
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the structural invariants the engine relies on
    ///
    /// Exactly 4 legs and 12 joints, unique joint and leg ids, and every
    /// leg's chain referencing configured joints.
    pub fn validate(&self) -> Result<()> {
        if self.legs.len() != NUM_LEGS || self.joints.len() != NUM_JOINTS {
            return Err(Error::Config(format!(
                "incorrect number of legs/joints configured: {}/{} != {}/{}",
                self.legs.len(),
                self.joints.len(),
                NUM_LEGS,
                NUM_JOINTS
            )));
        }

        let mut joint_ids: Vec<u8> = self.joints.iter().map(|j| j.id).collect();
        joint_ids.sort_unstable();
        joint_ids.dedup();
        if joint_ids.len() != NUM_JOINTS {
            return Err(Error::Config("duplicate joint id".into()));
        }

        let mut leg_ids: Vec<u8> = self.legs.iter().map(|l| l.leg).collect();
        leg_ids.sort_unstable();
        leg_ids.dedup();
        if leg_ids.len() != NUM_LEGS {
            return Err(Error::Config("duplicate leg id".into()));
        }

        for leg in &self.legs {
            for id in [leg.ik.shoulder.id, leg.ik.femur.id, leg.ik.tibia.id] {
                if joint_ids.binary_search(&id).is_err() {
                    return Err(Error::Config(format!(
                        "leg {} references unknown joint id {}",
                        leg.leg, id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a joint's sign convention. Unknown ids are a programming
    /// error: every id the engine handles comes from this configuration.
    pub fn sign(&self, id: u8) -> f64 {
        self.joints
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.sign)
            .unwrap_or_else(|| unreachable!("joint id {} not in configuration", id))
    }
}
