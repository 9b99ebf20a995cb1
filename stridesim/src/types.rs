// src/types.rs
//
// Shared core types for the stridesim environment: generalized-coordinate
// layout constants for the biped model, the PD target structure handed to
// the physics backend, the proprioceptive sensor snapshot it returns, and
// the fail-fast construction error type.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of the generalized position vector (pelvis pose + both legs,
/// including passive linkage coordinates).
pub const QPOS_LEN: usize = 35;

/// Length of the generalized velocity vector.
pub const QVEL_LEN: usize = 32;

/// Actuated motors (five per leg).
pub const NUM_MOTORS: usize = 10;

/// Unactuated joints surfaced by the state estimator (shin, tarsus, foot
/// per leg).
pub const NUM_JOINTS: usize = 6;

/// PD gains per leg.
pub const GAINS_PER_LEG: usize = 5;

/// Low-level physics timestep in seconds (2 kHz).
pub const SUBSTEP_DT: f64 = 0.0005;

/// qpos indices of the ten actuated motors:
/// hip roll / hip yaw / hip pitch / knee / foot, left then right.
pub const MOTOR_POS_IDX: [usize; NUM_MOTORS] = [7, 8, 9, 14, 20, 21, 22, 23, 28, 34];

/// qvel indices of the ten actuated motors, same ordering.
pub const MOTOR_VEL_IDX: [usize; NUM_MOTORS] = [6, 7, 8, 12, 18, 19, 20, 21, 25, 31];

/// qpos indices of the left and right shin springs (used by tracking
/// rewards).
pub const SPRING_POS_IDX: [usize; 2] = [15, 29];

/// qpos indices of the six unactuated estimator joints:
/// shin / tarsus / foot, left then right.
pub const JOINT_POS_IDX: [usize; NUM_JOINTS] = [15, 16, 20, 29, 30, 34];

/// qvel indices of the six unactuated estimator joints, same ordering.
pub const JOINT_VEL_IDX: [usize; NUM_JOINTS] = [13, 14, 18, 26, 27, 31];

/// World-frame quaternion (w, x, y, z) of a flat foot on level ground.
/// Deviation from this orientation is scored by the clock rewards.
pub const NEUTRAL_FOOT_ORIENT: [f64; 4] = [
    -0.247_908_864_545_473_23,
    -0.246_797_131_954_456_46,
    -0.660_939_670_436_718_5,
    0.663_921_021_343_526,
];

/// PD targets for one leg: five motors, pure position control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegPdTargets {
    /// Proportional gain per motor.
    pub p_gain: [f64; GAINS_PER_LEG],
    /// Derivative gain per motor.
    pub d_gain: [f64; GAINS_PER_LEG],
    /// Feed-forward torque per motor. Always zero for this controller.
    pub torque: [f64; GAINS_PER_LEG],
    /// Position target per motor.
    pub p_target: [f64; GAINS_PER_LEG],
    /// Velocity target per motor. Always zero for this controller.
    pub d_target: [f64; GAINS_PER_LEG],
}

impl Default for LegPdTargets {
    fn default() -> Self {
        Self {
            p_gain: [0.0; GAINS_PER_LEG],
            d_gain: [0.0; GAINS_PER_LEG],
            torque: [0.0; GAINS_PER_LEG],
            p_target: [0.0; GAINS_PER_LEG],
            d_target: [0.0; GAINS_PER_LEG],
        }
    }
}

/// Full PD command sent to the physics backend each sub-step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PdTargets {
    pub left: LegPdTargets,
    pub right: LegPdTargets,
}

/// Pelvis block of the sensor snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PelvisState {
    /// World-frame position (x forward, y lateral, z up).
    pub position: [f64; 3],
    /// Orientation quaternion (w, x, y, z).
    pub orientation: [f64; 4],
    /// Angular velocity in the pelvis frame.
    pub rotational_velocity: [f64; 3],
    /// Translational velocity in the world frame.
    pub translational_velocity: [f64; 3],
    /// Translational acceleration in the world frame.
    pub translational_acceleration: [f64; 3],
}

impl Default for PelvisState {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 1.01],
            orientation: [1.0, 0.0, 0.0, 0.0],
            rotational_velocity: [0.0; 3],
            translational_velocity: [0.0; 3],
            translational_acceleration: [0.0; 3],
        }
    }
}

/// Proprioceptive sensor snapshot returned by the backend after each PD
/// sub-step. Mirrors what a real state estimator would publish over the
/// command interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub pelvis: PelvisState,
    /// Terrain height under the pelvis.
    pub terrain_height: f64,
    /// Actuated motor positions, left leg then right leg.
    pub motor_position: [f64; NUM_MOTORS],
    /// Actuated motor velocities.
    pub motor_velocity: [f64; NUM_MOTORS],
    /// Unactuated joint positions (shin, tarsus, foot per leg).
    pub joint_position: [f64; NUM_JOINTS],
    /// Unactuated joint velocities.
    pub joint_velocity: [f64; NUM_JOINTS],
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            pelvis: PelvisState::default(),
            terrain_height: 0.0,
            motor_position: [
                0.0045, 0.0, 0.4973, -1.1997, -1.5968, 0.0045, 0.0, 0.4973, -1.1997, -1.5968,
            ],
            motor_velocity: [0.0; NUM_MOTORS],
            joint_position: [0.0, 1.4267, -1.5968, 0.0, 1.4267, -1.5968],
            joint_velocity: [0.0; NUM_JOINTS],
        }
    }
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Either tarsus body dropped below the knee-walking floor.
    TarsusCollapse,
    /// Pelvis height left the allowed band.
    PelvisHeightOutOfBounds,
    /// Reward fell below the active early-termination cutoff.
    RewardBelowCutoff,
}

impl TerminationReason {
    /// Stable lowercase name for logs/telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::TarsusCollapse => "tarsus_collapse",
            TerminationReason::PelvisHeightOutOfBounds => "pelvis_height_out_of_bounds",
            TerminationReason::RewardBelowCutoff => "reward_below_cutoff",
        }
    }
}

/// Construction-time configuration errors.
///
/// These are fatal by design: an unknown tag or a width mismatch must
/// never silently fall back to a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reward tag not registered with any variant.
    UnknownRewardTag(String),
    /// Trajectory style string not recognized.
    UnknownTrajectoryStyle(String),
    /// Trajectory has no samples.
    EmptyTrajectory,
    /// A trajectory sample does not match the generalized-coordinate
    /// layout.
    SampleWidthMismatch { expected: usize, got: usize },
    /// A clock table does not cover every phase index.
    ClockTableTooShort { needed: usize, got: usize },
    /// Clock-family reward selected but no clock tables supplied.
    MissingClockTables,
    /// Segment-summary observations selected but the trajectory carries
    /// no summary track.
    MissingSegmentSummaries,
    /// Trajectory source shape does not match the configured style
    /// (single cycle vs speed-keyed family).
    TrajectorySourceMismatch,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownRewardTag(tag) => write!(f, "unknown reward tag: {tag}"),
            ConfigError::UnknownTrajectoryStyle(style) => {
                write!(f, "unknown trajectory style: {style}")
            }
            ConfigError::EmptyTrajectory => write!(f, "reference trajectory has no samples"),
            ConfigError::SampleWidthMismatch { expected, got } => {
                write!(f, "trajectory sample width {got}, expected {expected}")
            }
            ConfigError::ClockTableTooShort { needed, got } => {
                write!(f, "clock table covers {got} phases, need {needed}")
            }
            ConfigError::MissingClockTables => {
                write!(f, "clock-family reward requires left/right clock tables")
            }
            ConfigError::MissingSegmentSummaries => {
                write!(f, "segment-summary observations require a summary track")
            }
            ConfigError::TrajectorySourceMismatch => {
                write!(f, "trajectory source shape does not match the configured style")
            }
        }
    }
}

impl Error for ConfigError {}
