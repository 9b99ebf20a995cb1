// src/sim/kinematic.rs
//
// Deterministic kinematic backend for tests and the research harness.
//
// Motors track their PD position targets first-order with a rate set by
// the commanded proportional gain; the pelvis and passive linkage hold
// whatever pose was last written with set_qpos. Contact is modeled as
// "foot at ground level carries the standing load". Test scenarios can
// queue ScriptFrame overrides to drive exact pelvis-height, foot-force
// and foot-position sequences through the environment.

use std::collections::VecDeque;

use glam::DQuat;

use crate::sim::{Body, PhysicsSim};
use crate::types::{
    PdTargets, PelvisState, SensorState, JOINT_POS_IDX, JOINT_VEL_IDX, MOTOR_POS_IDX,
    MOTOR_VEL_IDX, NEUTRAL_FOOT_ORIENT, NUM_JOINTS, NUM_MOTORS, QPOS_LEN, QVEL_LEN, SUBSTEP_DT,
};

/// Nominal vertical load carried by a grounded foot (half the robot
/// weight).
const STANCE_FORCE: f64 = 400.0;

/// Foot height at or below which the default contact model reports
/// force.
const CONTACT_HEIGHT: f64 = 0.005;

/// Default lateral stance width of the feet.
const FOOT_Y: f64 = 0.135;

/// Pelvis-to-tarsus drop in the default standing pose.
const TARSUS_DROP: f64 = 0.3;

/// One sub-step of scripted sensor overrides.
///
/// Fields left as `None` fall through to the kinematic model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptFrame {
    pub pelvis_z: Option<f64>,
    pub foot_forces: Option<[f64; 2]>,
    pub foot_positions: Option<[f64; 6]>,
    pub tarsus_heights: Option<[f64; 2]>,
}

/// Deterministic kinematic stand-in for the external physics engine.
pub struct KinematicSim {
    qpos: Vec<f64>,
    qvel: Vec<f64>,
    prev_translational_velocity: [f64; 3],
    foot_positions: [f64; 6],
    tarsus_heights: [f64; 2],
    scripted_forces: Option<[f64; 2]>,
    script: VecDeque<ScriptFrame>,
    // Staged vs committed randomization parameters.
    staged_friction: [f64; 3],
    staged_ground_quat: [f64; 4],
    staged_damping: Vec<f64>,
    staged_mass: Vec<f64>,
    friction: [f64; 3],
    ground_quat: [f64; 4],
    damping: Vec<f64>,
    mass: Vec<f64>,
}

impl Default for KinematicSim {
    fn default() -> Self {
        Self::new()
    }
}

impl KinematicSim {
    pub fn new() -> Self {
        let mut sim = Self {
            qpos: vec![0.0; QPOS_LEN],
            qvel: vec![0.0; QVEL_LEN],
            prev_translational_velocity: [0.0; 3],
            foot_positions: [0.1, FOOT_Y, 0.0, 0.1, -FOOT_Y, 0.0],
            tarsus_heights: [0.0, 0.0],
            scripted_forces: None,
            script: VecDeque::new(),
            staged_friction: [1.0, 0.005, 0.0001],
            staged_ground_quat: [1.0, 0.0, 0.0, 0.0],
            staged_damping: Vec::new(),
            staged_mass: Vec::new(),
            friction: [1.0, 0.005, 0.0001],
            ground_quat: [1.0, 0.0, 0.0, 0.0],
            damping: Vec::new(),
            mass: Vec::new(),
        };
        sim.write_default_pose();
        sim
    }

    /// Queue scripted sensor overrides, consumed one frame per sub-step.
    pub fn push_script(&mut self, frames: impl IntoIterator<Item = ScriptFrame>) {
        self.script.extend(frames);
    }

    /// Pin the reported foot forces until cleared (`None` restores the
    /// height-based contact model).
    pub fn set_scripted_forces(&mut self, forces: Option<[f64; 2]>) {
        self.scripted_forces = forces;
    }

    /// Committed ground friction (for assertions in tests).
    pub fn ground_friction(&self) -> [f64; 3] {
        self.friction
    }

    /// Committed ground orientation (for assertions in tests).
    pub fn ground_orientation(&self) -> [f64; 4] {
        self.ground_quat
    }

    /// Committed joint damping (for assertions in tests).
    pub fn joint_damping(&self) -> &[f64] {
        &self.damping
    }

    /// Committed body masses (for assertions in tests).
    pub fn body_mass(&self) -> &[f64] {
        &self.mass
    }

    fn write_default_pose(&mut self) {
        self.qpos.iter_mut().for_each(|v| *v = 0.0);
        self.qvel.iter_mut().for_each(|v| *v = 0.0);
        self.qpos[2] = 1.01;
        self.qpos[3] = 1.0; // identity quaternion
        let neutral = [0.0045, 0.0, 0.4973, -1.1997, -1.5968];
        for leg in 0..2 {
            for (i, v) in neutral.iter().enumerate() {
                self.qpos[MOTOR_POS_IDX[leg * 5 + i]] = *v;
            }
        }
        // Passive shin/tarsus angles of the standing pose.
        for leg in 0..2 {
            self.qpos[JOINT_POS_IDX[leg * 3 + 1]] = 1.4267;
            self.qpos[JOINT_POS_IDX[leg * 3 + 2]] = -1.5968;
        }
        self.prev_translational_velocity = [0.0; 3];
        self.foot_positions = [0.1, FOOT_Y, 0.0, 0.1, -FOOT_Y, 0.0];
        self.tarsus_heights = [self.qpos[2] - TARSUS_DROP, self.qpos[2] - TARSUS_DROP];
    }

    fn tracking_rate(p_gain: f64) -> f64 {
        // Higher commanded stiffness closes the error faster; clamp so a
        // single sub-step never overshoots.
        (p_gain * SUBSTEP_DT * 0.2).clamp(0.0, 1.0)
    }

    fn sensor_state(&mut self) -> SensorState {
        let vel = [self.qvel[0], self.qvel[1], self.qvel[2]];
        let accel = [
            (vel[0] - self.prev_translational_velocity[0]) / SUBSTEP_DT,
            (vel[1] - self.prev_translational_velocity[1]) / SUBSTEP_DT,
            (vel[2] - self.prev_translational_velocity[2]) / SUBSTEP_DT,
        ];
        self.prev_translational_velocity = vel;

        let mut motor_position = [0.0; NUM_MOTORS];
        let mut motor_velocity = [0.0; NUM_MOTORS];
        for i in 0..NUM_MOTORS {
            motor_position[i] = self.qpos[MOTOR_POS_IDX[i]];
            motor_velocity[i] = self.qvel[MOTOR_VEL_IDX[i]];
        }
        let mut joint_position = [0.0; NUM_JOINTS];
        let mut joint_velocity = [0.0; NUM_JOINTS];
        for i in 0..NUM_JOINTS {
            joint_position[i] = self.qpos[JOINT_POS_IDX[i]];
            joint_velocity[i] = self.qvel[JOINT_VEL_IDX[i]];
        }

        SensorState {
            pelvis: PelvisState {
                position: [self.qpos[0], self.qpos[1], self.qpos[2]],
                orientation: [self.qpos[3], self.qpos[4], self.qpos[5], self.qpos[6]],
                rotational_velocity: [self.qvel[3], self.qvel[4], self.qvel[5]],
                translational_velocity: vel,
                translational_acceleration: accel,
            },
            terrain_height: 0.0,
            motor_position,
            motor_velocity,
            joint_position,
            joint_velocity,
        }
    }
}

impl PhysicsSim for KinematicSim {
    fn step_pd(&mut self, targets: &PdTargets) -> SensorState {
        if let Some(frame) = self.script.pop_front() {
            if let Some(z) = frame.pelvis_z {
                self.qpos[2] = z;
            }
            if let Some(forces) = frame.foot_forces {
                self.scripted_forces = Some(forces);
            }
            if let Some(feet) = frame.foot_positions {
                self.foot_positions = feet;
            }
            if let Some(tarsus) = frame.tarsus_heights {
                self.tarsus_heights = tarsus;
            }
        }

        for leg in 0..2 {
            let leg_targets = if leg == 0 { &targets.left } else { &targets.right };
            for i in 0..5 {
                let qi = MOTOR_POS_IDX[leg * 5 + i];
                let vi = MOTOR_VEL_IDX[leg * 5 + i];
                let prev = self.qpos[qi];
                let rate = Self::tracking_rate(leg_targets.p_gain[i]);
                let next = prev + (leg_targets.p_target[i] - prev) * rate;
                self.qpos[qi] = next;
                self.qvel[vi] = (next - prev) / SUBSTEP_DT;
            }
        }

        self.sensor_state()
    }

    fn qpos(&self) -> &[f64] {
        &self.qpos
    }

    fn qvel(&self) -> &[f64] {
        &self.qvel
    }

    fn foot_forces(&self) -> [f64; 2] {
        if let Some(forces) = self.scripted_forces {
            return forces;
        }
        let left = if self.foot_positions[2] <= CONTACT_HEIGHT {
            STANCE_FORCE
        } else {
            0.0
        };
        let right = if self.foot_positions[5] <= CONTACT_HEIGHT {
            STANCE_FORCE
        } else {
            0.0
        };
        [left, right]
    }

    fn foot_positions(&self) -> [f64; 6] {
        self.foot_positions
    }

    fn body_position(&self, body: Body) -> [f64; 3] {
        match body {
            Body::Pelvis => [self.qpos[0], self.qpos[1], self.qpos[2]],
            Body::LeftTarsus => [self.qpos[0], self.qpos[1] + FOOT_Y, self.tarsus_heights[0]],
            Body::RightTarsus => [self.qpos[0], self.qpos[1] - FOOT_Y, self.tarsus_heights[1]],
            Body::LeftFoot => [
                self.foot_positions[0],
                self.foot_positions[1],
                self.foot_positions[2],
            ],
            Body::RightFoot => [
                self.foot_positions[3],
                self.foot_positions[4],
                self.foot_positions[5],
            ],
        }
    }

    fn body_quat(&self, body: Body) -> [f64; 4] {
        match body {
            Body::Pelvis => [self.qpos[3], self.qpos[4], self.qpos[5], self.qpos[6]],
            // Feet follow the ground plane in this model.
            Body::LeftFoot | Body::RightFoot => {
                let ground = DQuat::from_xyzw(
                    self.ground_quat[1],
                    self.ground_quat[2],
                    self.ground_quat[3],
                    self.ground_quat[0],
                );
                let neutral = DQuat::from_xyzw(
                    NEUTRAL_FOOT_ORIENT[1],
                    NEUTRAL_FOOT_ORIENT[2],
                    NEUTRAL_FOOT_ORIENT[3],
                    NEUTRAL_FOOT_ORIENT[0],
                );
                let q = ground * neutral;
                [q.w, q.x, q.y, q.z]
            }
            Body::LeftTarsus | Body::RightTarsus => [1.0, 0.0, 0.0, 0.0],
        }
    }

    fn set_qpos(&mut self, qpos: &[f64]) {
        let n = qpos.len().min(self.qpos.len());
        self.qpos[..n].copy_from_slice(&qpos[..n]);
        self.tarsus_heights = [self.qpos[2] - TARSUS_DROP, self.qpos[2] - TARSUS_DROP];
    }

    fn set_qvel(&mut self, qvel: &[f64]) {
        let n = qvel.len().min(self.qvel.len());
        self.qvel[..n].copy_from_slice(&qvel[..n]);
        self.prev_translational_velocity = [self.qvel[0], self.qvel[1], self.qvel[2]];
    }

    fn reset_to_default(&mut self) {
        self.write_default_pose();
        self.script.clear();
        self.scripted_forces = None;
    }

    fn set_ground_friction(&mut self, friction: [f64; 3]) {
        self.staged_friction = friction;
    }

    fn set_ground_orientation(&mut self, quat: [f64; 4]) {
        self.staged_ground_quat = quat;
    }

    fn set_joint_damping(&mut self, damping: &[f64]) {
        self.staged_damping = damping.to_vec();
    }

    fn set_body_mass(&mut self, mass: &[f64]) {
        self.staged_mass = mass.to_vec();
    }

    fn commit_parameter_changes(&mut self) {
        self.friction = self.staged_friction;
        self.ground_quat = self.staged_ground_quat;
        self.damping = self.staged_damping.clone();
        self.mass = self.staged_mass.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PdTargets;

    #[test]
    fn test_motors_track_targets() {
        let mut sim = KinematicSim::new();
        let mut targets = PdTargets::default();
        for i in 0..5 {
            targets.left.p_gain[i] = 100.0;
            targets.right.p_gain[i] = 100.0;
            targets.left.p_target[i] = 0.5;
            targets.right.p_target[i] = 0.5;
        }

        let before = sim.qpos()[MOTOR_POS_IDX[0]];
        for _ in 0..200 {
            sim.step_pd(&targets);
        }
        let after = sim.qpos()[MOTOR_POS_IDX[0]];

        assert!((after - 0.5).abs() < (before - 0.5).abs());
    }

    #[test]
    fn test_parameter_changes_apply_on_commit() {
        let mut sim = KinematicSim::new();
        sim.set_ground_friction([0.7, 0.002, 0.0002]);
        assert_ne!(sim.ground_friction(), [0.7, 0.002, 0.0002]);

        sim.commit_parameter_changes();
        assert_eq!(sim.ground_friction(), [0.7, 0.002, 0.0002]);
    }

    #[test]
    fn test_scripted_frames_override_sensors() {
        let mut sim = KinematicSim::new();
        sim.push_script([ScriptFrame {
            pelvis_z: Some(0.35),
            foot_forces: Some([0.0, 0.0]),
            ..ScriptFrame::default()
        }]);

        let state = sim.step_pd(&PdTargets::default());
        assert!((state.pelvis.position[2] - 0.35).abs() < 1e-12);
        assert_eq!(sim.foot_forces(), [0.0, 0.0]);
    }
}
