// src/sim/mod.rs
//
// Physics-backend boundary.
//
// The environment core never integrates dynamics itself: it drives an
// implementation of `PhysicsSim` and consumes its sensor readings. An
// engine-backed implementation lives outside this crate; the in-tree
// `KinematicSim` is a deterministic kinematic stand-in for tests and the
// research harness.

pub mod kinematic;

pub use kinematic::{KinematicSim, ScriptFrame};

use crate::types::{PdTargets, SensorState};

/// Named bodies the environment core queries directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    Pelvis,
    LeftTarsus,
    RightTarsus,
    LeftFoot,
    RightFoot,
}

/// Contract the environment expects from a physics backend.
///
/// One `step_pd` call advances rigid-body state by exactly one low-level
/// timestep (`SUBSTEP_DT`). Parameter setters stage edits that only take
/// effect after `commit_parameter_changes`, matching how simulators
/// rebuild their constant caches.
pub trait PhysicsSim {
    /// Apply PD targets, advance one sub-step, return sensor readings.
    fn step_pd(&mut self, targets: &PdTargets) -> SensorState;

    /// Full generalized position vector.
    fn qpos(&self) -> &[f64];

    /// Full generalized velocity vector.
    fn qvel(&self) -> &[f64];

    /// Vertical contact force under each foot, left then right.
    fn foot_forces(&self) -> [f64; 2];

    /// World-frame foot positions: left xyz then right xyz.
    fn foot_positions(&self) -> [f64; 6];

    /// World-frame position of a named body.
    fn body_position(&self, body: Body) -> [f64; 3];

    /// World-frame orientation quaternion (w, x, y, z) of a named body.
    fn body_quat(&self, body: Body) -> [f64; 4];

    /// Overwrite the generalized position vector.
    fn set_qpos(&mut self, qpos: &[f64]);

    /// Overwrite the generalized velocity vector.
    fn set_qvel(&mut self, qvel: &[f64]);

    /// Restore the default standing state and default parameters.
    fn reset_to_default(&mut self);

    /// Stage ground friction (sliding, torsional, rolling).
    fn set_ground_friction(&mut self, friction: [f64; 3]);

    /// Stage a ground-plane orientation quaternion (w, x, y, z).
    fn set_ground_orientation(&mut self, quat: [f64; 4]);

    /// Stage per-dof joint damping.
    fn set_joint_damping(&mut self, damping: &[f64]);

    /// Stage per-body mass.
    fn set_body_mass(&mut self, mass: &[f64]);

    /// Apply all staged parameter edits.
    fn commit_parameter_changes(&mut self);
}
