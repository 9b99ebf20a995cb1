//! Stridesim core library.
//!
//! A simulated-robot control environment for a bipedal legged robot:
//! drives a physics backend with PD torque targets at a fixed high rate,
//! tracks gait phase against a reference trajectory, derives the
//! policy-facing observation vector, and scores behavior with a family
//! of reward strategies. Training loops consume it as a black-box
//! reset/step interface.
//!
//! # Architecture
//!
//! - **Trajectory** (`trajectory`): immutable reference cycles with
//!   phase-indexed, speed-scaled lookup.
//! - **Contact** (`contact`): per-foot hysteresis state machine plus
//!   per-control-step accumulators.
//! - **Randomize** (`randomize`): deterministic per-episode dynamics
//!   randomization.
//! - **Observation** (`observation`): observation assembly, history
//!   ring and the analytic left/right mirror map.
//! - **Action** (`action`): policy action to PD target mapping.
//! - **Reward** (`reward`): tagged reward variants resolved at
//!   construction.
//! - **Env** (`env`): the episode controller composing the above into
//!   Gym-style reset/step, plus a share-nothing VecEnv.
//! - **Sim** (`sim`): the physics-backend boundary trait and a
//!   deterministic kinematic backend for tests and harnesses.
//!
//! The physics integrator, trajectory files, clock tables, rendering and
//! the learning algorithm all live outside this crate.

pub mod action;
pub mod config;
pub mod contact;
pub mod env;
pub mod logging;
pub mod metrics;
pub mod observation;
pub mod randomize;
pub mod reward;
pub mod sim;
pub mod trajectory;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{EnvConfig, TrajStyle};

pub use action::{ActionTargetMapper, DEFAULT_D_GAIN, DEFAULT_P_GAIN, NEUTRAL_POSE};

pub use contact::{ContactAverages, ContactStateTracker};

pub use env::{GaitEnv, PhaseClock, StepInfo, StepResult, TrajectorySource, VecEnv};

pub use logging::{EventSink, FileSink, NoopSink};

pub use observation::{
    MirrorEntry, MirrorMap, ObservationAssembler, PhaseDescriptor, ESTIMATOR_STATE_SIZE,
    RAW_STATE_SIZE,
};

pub use randomize::{
    DynamicsRandConfig, DynamicsRandSampler, RandomizationSample, NUM_GAIN_DELTAS,
    NUM_JOINT_OFFSETS,
};

pub use reward::{ClockTable, RewardClocks, RewardStrategy, RewardVariant};

pub use sim::{Body, KinematicSim, PhysicsSim, ScriptFrame};

pub use trajectory::{
    synthetic_segment_family, synthetic_walking, ReferenceSample, ReferenceTrajectory,
    SegmentFamily, TrajectoryMode,
};

pub use types::{
    ConfigError, PdTargets, SensorState, TerminationReason, NUM_JOINTS, NUM_MOTORS, QPOS_LEN,
    QVEL_LEN,
};
