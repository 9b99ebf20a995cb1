// src/observation.rs
//
// Observation assembly and the left/right mirror map.
//
// A frame is the concatenation of a proprioceptive robot block and one
// phase descriptor:
// - robot block: 46-wide state-estimator layout, or 40-wide raw
//   generalized-coordinate slices;
// - descriptor: sinusoidal clock pair + commanded speed, a slice of the
//   next reference state, or an 18-wide segment summary.
// The assembler keeps a history ring `history + 1` frames deep, most
// recent first, zero-initialized at reset, and returns the flattened
// ring each step.
//
// The mirror map is derived from the layout at construction, never
// hand-tuned per index: each output index carries a (source, sign) pair
// such that applying the map yields the observation of the left/right
// mirrored gait. Applying it twice is the identity.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::randomize::NUM_JOINT_OFFSETS;
use crate::types::{SensorState, NUM_JOINTS, NUM_MOTORS};

/// Width of the estimator robot block.
pub const ESTIMATOR_STATE_SIZE: usize = 46;

/// Width of the raw generalized-coordinate robot block.
pub const RAW_STATE_SIZE: usize = 40;

/// Clock descriptor width (sin, cos).
pub const CLOCK_SIZE: usize = 2;

/// Commanded-speed descriptor width.
pub const SPEED_SIZE: usize = 1;

/// Reference-slice descriptor width (20 positions + 20 velocities).
pub const REF_SLICE_SIZE: usize = 40;

/// Segment-summary descriptor width (left foot, right foot, center of
/// mass; position + velocity each).
pub const SEGMENT_SUMMARY_SIZE: usize = 18;

/// qpos indices surfaced in the raw robot block and reference slice:
/// everything except forward position, passive linkage quaternions and
/// linkage crank angles. Forward position is global and irrelevant to
/// phase-based control; height is trajectory-invariant; lateral position
/// only stays meaningful for straight-line references.
pub const POS_INDEX: [usize; 20] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 14, 15, 16, 20, 21, 22, 23, 28, 29, 30, 34,
];

/// qvel indices surfaced in the raw robot block and reference slice.
pub const VEL_INDEX: [usize; 20] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 13, 14, 18, 19, 20, 21, 25, 26, 27, 31,
];

/// Phase descriptor selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseDescriptor {
    /// 2-cycle sinusoidal clock pair plus commanded speed.
    Clock,
    /// Slice of the next reference pose/velocity.
    ReferenceSlice,
    /// Segment-trajectory global-state summary.
    SegmentSummary,
}

impl PhaseDescriptor {
    pub fn size(&self) -> usize {
        match self {
            PhaseDescriptor::Clock => CLOCK_SIZE + SPEED_SIZE,
            PhaseDescriptor::ReferenceSlice => REF_SLICE_SIZE,
            PhaseDescriptor::SegmentSummary => SEGMENT_SUMMARY_SIZE,
        }
    }
}

/// Descriptor inputs for one frame.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorInputs<'a> {
    Clock {
        phase: usize,
        phaselen: usize,
        speed: f64,
    },
    ReferenceSlice {
        ref_pos: &'a [f64],
        ref_vel: &'a [f64],
    },
    SegmentSummary {
        summary: &'a [f64; SEGMENT_SUMMARY_SIZE],
    },
}

/// Inputs for one observation frame.
#[derive(Debug, Clone, Copy)]
pub struct ObservationInputs<'a> {
    pub sensor: &'a SensorState,
    pub qpos: &'a [f64],
    pub qvel: &'a [f64],
    /// Commanded yaw offset, removed from the pelvis frame.
    pub orient_add: f64,
    /// Joint trims folded into the reported positions, mimicking
    /// miscalibrated encoders.
    pub joint_offsets: Option<&'a [f64; NUM_JOINT_OFFSETS]>,
    pub descriptor: DescriptorInputs<'a>,
}

/// One signed source entry of a mirror permutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub src: usize,
    pub sign: f64,
}

/// Signed permutations encoding bodily left/right symmetry for one
/// observation frame and one action vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorMap {
    obs: Vec<MirrorEntry>,
    act: Vec<MirrorEntry>,
}

impl MirrorMap {
    pub fn obs_entries(&self) -> &[MirrorEntry] {
        &self.obs
    }

    pub fn act_entries(&self) -> &[MirrorEntry] {
        &self.act
    }

    /// Mirror a (possibly history-stacked) observation. The vector length
    /// must be a multiple of the frame width; the per-frame map is tiled
    /// across the stack.
    pub fn apply_obs(&self, obs: &[f64]) -> Vec<f64> {
        let frame = self.obs.len();
        assert!(
            frame > 0 && obs.len() % frame == 0,
            "observation length must be a multiple of the frame width"
        );
        let mut out = vec![0.0; obs.len()];
        for f in 0..obs.len() / frame {
            let base = f * frame;
            for (i, entry) in self.obs.iter().enumerate() {
                out[base + i] = entry.sign * obs[base + entry.src];
            }
        }
        out
    }

    /// Mirror an action vector.
    pub fn apply_action(&self, action: &[f64]) -> Vec<f64> {
        assert_eq!(action.len(), self.act.len(), "action width mismatch");
        self.act
            .iter()
            .map(|entry| entry.sign * action[entry.src])
            .collect()
    }
}

/// Append identity entries covering `range`.
fn push_identity(map: &mut Vec<MirrorEntry>, range: std::ops::Range<usize>) {
    for src in range {
        map.push(MirrorEntry { src, sign: 1.0 });
    }
}

/// Append entries that swap two equally-shaped blocks, applying `signs`
/// within each block.
fn push_swapped_blocks(
    map: &mut Vec<MirrorEntry>,
    left_start: usize,
    right_start: usize,
    signs: &[f64],
) {
    for (i, sign) in signs.iter().enumerate() {
        map.push(MirrorEntry {
            src: right_start + i,
            sign: *sign,
        });
    }
    for (i, sign) in signs.iter().enumerate() {
        map.push(MirrorEntry {
            src: left_start + i,
            sign: *sign,
        });
    }
}

/// Append entries that negate selected offsets of a contiguous block.
fn push_signed(map: &mut Vec<MirrorEntry>, start: usize, signs: &[f64]) {
    for (i, sign) in signs.iter().enumerate() {
        map.push(MirrorEntry {
            src: start + i,
            sign: *sign,
        });
    }
}

/// Motor-block mirror signs: hip roll and hip yaw flip under reflection,
/// the pitch-plane joints do not.
const MOTOR_SIGNS: [f64; 5] = [-1.0, -1.0, 1.0, 1.0, 1.0];

/// Leg block of the raw slices: hip roll/yaw/pitch, knee, shin, tarsus,
/// foot.
const RAW_LEG_SIGNS: [f64; 7] = [-1.0, -1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

fn estimator_robot_mirror(map: &mut Vec<MirrorEntry>) {
    // Pelvis height.
    push_identity(map, 0..1);
    // Orientation quaternion: reflection negates the x and z components.
    push_signed(map, 1, &[1.0, -1.0, 1.0, -1.0]);
    // Motor positions, left <-> right.
    push_swapped_blocks(map, 5, 10, &MOTOR_SIGNS);
    // Translational velocity: lateral flips.
    push_signed(map, 15, &[1.0, -1.0, 1.0]);
    // Rotational velocity: roll and yaw rates flip.
    push_signed(map, 18, &[-1.0, 1.0, -1.0]);
    // Motor velocities, left <-> right.
    push_swapped_blocks(map, 21, 26, &MOTOR_SIGNS);
    // Translational acceleration: lateral flips.
    push_signed(map, 31, &[1.0, -1.0, 1.0]);
    // Unactuated joint positions and velocities, left <-> right.
    push_swapped_blocks(map, 34, 37, &[1.0, 1.0, 1.0]);
    push_swapped_blocks(map, 40, 43, &[1.0, 1.0, 1.0]);
}

fn raw_robot_mirror(map: &mut Vec<MirrorEntry>) {
    // qpos slice: lateral position and height stay, quaternion x/z flip.
    push_signed(map, 0, &[1.0, 1.0, 1.0, -1.0, 1.0, -1.0]);
    push_swapped_blocks(map, 6, 13, &RAW_LEG_SIGNS);
    // qvel slice: lateral velocity, roll and yaw rates flip.
    push_signed(map, 20, &[1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);
    push_swapped_blocks(map, 26, 33, &RAW_LEG_SIGNS);
}

fn descriptor_mirror(map: &mut Vec<MirrorEntry>, base: usize, descriptor: PhaseDescriptor) {
    match descriptor {
        PhaseDescriptor::Clock => {
            // Clock and speed are symmetric under reflection.
            push_identity(map, base..base + CLOCK_SIZE + SPEED_SIZE);
        }
        PhaseDescriptor::ReferenceSlice => {
            // Matches the recorded mirror tables: the pelvis entries of
            // the slice keep their sign; only the leg blocks swap.
            let mut entries = Vec::with_capacity(REF_SLICE_SIZE);
            push_identity(&mut entries, 0..6);
            push_swapped_blocks(&mut entries, 6, 13, &RAW_LEG_SIGNS);
            push_identity_offset(&mut entries, 20, 6);
            push_swapped_blocks(&mut entries, 26, 33, &RAW_LEG_SIGNS);
            for e in entries {
                map.push(MirrorEntry {
                    src: base + e.src,
                    sign: e.sign,
                });
            }
        }
        PhaseDescriptor::SegmentSummary => {
            // Foot blocks swap; the center-of-mass block is shared.
            let mut entries = Vec::with_capacity(SEGMENT_SUMMARY_SIZE);
            push_swapped_blocks(&mut entries, 0, 6, &[1.0; 6]);
            push_identity(&mut entries, 12..18);
            for e in entries {
                map.push(MirrorEntry {
                    src: base + e.src,
                    sign: e.sign,
                });
            }
        }
    }
}

fn push_identity_offset(map: &mut Vec<MirrorEntry>, start: usize, len: usize) {
    push_identity(map, start..start + len);
}

fn action_mirror(learn_gains: bool) -> Vec<MirrorEntry> {
    let mut map = Vec::new();
    // Pose targets: swap legs, flip hip roll and yaw.
    push_swapped_blocks(&mut map, 0, 5, &MOTOR_SIGNS);
    if learn_gains {
        // Gain deltas: swap legs, magnitudes unchanged.
        push_swapped_blocks(&mut map, 10, 15, &[1.0; 5]);
        push_swapped_blocks(&mut map, 20, 25, &[1.0; 5]);
    }
    map
}

/// Builds per-step observations and owns the history ring.
#[derive(Debug, Clone)]
pub struct ObservationAssembler {
    state_est: bool,
    descriptor: PhaseDescriptor,
    history: usize,
    frame_size: usize,
    frames: Vec<Vec<f64>>,
}

impl ObservationAssembler {
    pub fn new(state_est: bool, descriptor: PhaseDescriptor, history: usize) -> Self {
        let robot = if state_est {
            ESTIMATOR_STATE_SIZE
        } else {
            RAW_STATE_SIZE
        };
        let frame_size = robot + descriptor.size();
        let mut assembler = Self {
            state_est,
            descriptor,
            history,
            frame_size,
            frames: Vec::new(),
        };
        assembler.reset();
        assembler
    }

    /// Width of one frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Width of the full stacked observation.
    pub fn obs_size(&self) -> usize {
        self.frame_size * (self.history + 1)
    }

    /// Indices of the clock pair within a frame, when present.
    pub fn clock_inds(&self) -> Option<[usize; 2]> {
        match self.descriptor {
            PhaseDescriptor::Clock => {
                let robot = if self.state_est {
                    ESTIMATOR_STATE_SIZE
                } else {
                    RAW_STATE_SIZE
                };
                Some([robot, robot + 1])
            }
            _ => None,
        }
    }

    /// Zero the history ring.
    pub fn reset(&mut self) {
        self.frames = vec![vec![0.0; self.frame_size]; self.history + 1];
    }

    /// Derive the mirror map for this layout.
    pub fn mirror_map(&self, learn_gains: bool) -> MirrorMap {
        let mut obs = Vec::with_capacity(self.frame_size);
        if self.state_est {
            estimator_robot_mirror(&mut obs);
        } else {
            raw_robot_mirror(&mut obs);
        }
        let robot = obs.len();
        descriptor_mirror(&mut obs, robot, self.descriptor);
        debug_assert_eq!(obs.len(), self.frame_size);

        MirrorMap {
            obs,
            act: action_mirror(learn_gains),
        }
    }

    /// Build one frame, push it onto the ring, return the stacked
    /// observation (most recent frame first).
    pub fn assemble(&mut self, inputs: &ObservationInputs<'_>) -> Vec<f64> {
        let mut frame = Vec::with_capacity(self.frame_size);
        if self.state_est {
            self.push_estimator_block(&mut frame, inputs);
        } else {
            self.push_raw_block(&mut frame, inputs);
        }
        self.push_descriptor(&mut frame, inputs);
        debug_assert_eq!(frame.len(), self.frame_size);

        self.frames.insert(0, frame);
        self.frames.truncate(self.history + 1);

        let mut out = Vec::with_capacity(self.obs_size());
        for f in &self.frames {
            out.extend_from_slice(f);
        }
        out
    }

    fn push_estimator_block(&self, frame: &mut Vec<f64>, inputs: &ObservationInputs<'_>) {
        let sensor = inputs.sensor;

        // Remove the commanded yaw so the policy always walks "forward"
        // in its own frame.
        let q = sensor.pelvis.orientation;
        let pelvis_quat = DQuat::from_xyzw(q[1], q[2], q[3], q[0]);
        let inv_command = DQuat::from_rotation_z(inputs.orient_add).inverse();
        let mut corrected = inv_command * pelvis_quat;
        if corrected.w < 0.0 {
            corrected = -corrected;
        }

        let v = sensor.pelvis.translational_velocity;
        let a = sensor.pelvis.translational_acceleration;
        let vel = inv_command * DVec3::new(v[0], v[1], v[2]);
        let accel = inv_command * DVec3::new(a[0], a[1], a[2]);

        let mut motor_pos = sensor.motor_position;
        let mut joint_pos = sensor.joint_position;
        if let Some(offsets) = inputs.joint_offsets {
            for i in 0..NUM_MOTORS {
                motor_pos[i] += offsets[i];
            }
            for i in 0..NUM_JOINTS {
                joint_pos[i] += offsets[NUM_MOTORS + i];
            }
        }

        frame.push(sensor.pelvis.position[2] - sensor.terrain_height);
        frame.extend_from_slice(&[corrected.w, corrected.x, corrected.y, corrected.z]);
        frame.extend_from_slice(&motor_pos);
        frame.extend_from_slice(&[vel.x, vel.y, vel.z]);
        frame.extend_from_slice(&sensor.pelvis.rotational_velocity);
        frame.extend_from_slice(&sensor.motor_velocity);
        frame.extend_from_slice(&[accel.x, accel.y, accel.z]);
        frame.extend_from_slice(&joint_pos);
        frame.extend_from_slice(&sensor.joint_velocity);
    }

    fn push_raw_block(&self, frame: &mut Vec<f64>, inputs: &ObservationInputs<'_>) {
        for &i in POS_INDEX.iter() {
            frame.push(inputs.qpos[i]);
        }
        for &i in VEL_INDEX.iter() {
            frame.push(inputs.qvel[i]);
        }
    }

    fn push_descriptor(&self, frame: &mut Vec<f64>, inputs: &ObservationInputs<'_>) {
        match (self.descriptor, &inputs.descriptor) {
            (
                PhaseDescriptor::Clock,
                DescriptorInputs::Clock {
                    phase,
                    phaselen,
                    speed,
                },
            ) => {
                let angle = 2.0 * std::f64::consts::PI * (*phase as f64) / (*phaselen as f64);
                frame.push(angle.sin());
                frame.push(angle.cos());
                frame.push(*speed);
            }
            (
                PhaseDescriptor::ReferenceSlice,
                DescriptorInputs::ReferenceSlice { ref_pos, ref_vel },
            ) => {
                for &i in POS_INDEX.iter() {
                    frame.push(ref_pos[i]);
                }
                for &i in VEL_INDEX.iter() {
                    frame.push(ref_vel[i]);
                }
            }
            (PhaseDescriptor::SegmentSummary, DescriptorInputs::SegmentSummary { summary }) => {
                frame.extend_from_slice(&summary[..]);
            }
            _ => unreachable!("descriptor inputs must match the configured layout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorState;

    fn synthetic_vector(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64 + 1.0) * 0.01).collect()
    }

    fn assert_involution(map: &MirrorMap, frame: usize) {
        let v = synthetic_vector(frame);
        let once = map.apply_obs(&v);
        let twice = map.apply_obs(&once);
        for (a, b) in v.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-12, "mirroring must be an involution");
        }
    }

    #[test]
    fn test_mirror_involution_all_layouts() {
        for (state_est, descriptor) in [
            (true, PhaseDescriptor::Clock),
            (true, PhaseDescriptor::ReferenceSlice),
            (false, PhaseDescriptor::Clock),
            (false, PhaseDescriptor::ReferenceSlice),
            (false, PhaseDescriptor::SegmentSummary),
        ] {
            let assembler = ObservationAssembler::new(state_est, descriptor, 0);
            let map = assembler.mirror_map(false);
            assert_eq!(map.obs_entries().len(), assembler.frame_size());
            assert_involution(&map, assembler.frame_size());
        }
    }

    #[test]
    fn test_action_mirror_involution() {
        for learn_gains in [false, true] {
            let assembler = ObservationAssembler::new(true, PhaseDescriptor::Clock, 0);
            let map = assembler.mirror_map(learn_gains);
            let width = if learn_gains { 30 } else { 10 };
            let v = synthetic_vector(width);
            let twice = map.apply_action(&map.apply_action(&v));
            for (a, b) in v.iter().zip(twice.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_action_mirror_swaps_legs_and_flips_abduction() {
        let assembler = ObservationAssembler::new(true, PhaseDescriptor::Clock, 0);
        let map = assembler.mirror_map(false);
        let mut action = vec![0.0; 10];
        action[0] = 0.3; // left hip roll
        action[7] = 0.5; // right hip pitch

        let mirrored = map.apply_action(&action);
        assert!((mirrored[5] + 0.3).abs() < 1e-12, "roll swaps leg and flips sign");
        assert!((mirrored[2] - 0.5).abs() < 1e-12, "pitch swaps leg unchanged");
    }

    #[test]
    fn test_mirror_tiles_over_history() {
        let assembler = ObservationAssembler::new(true, PhaseDescriptor::Clock, 2);
        let map = assembler.mirror_map(false);
        let stacked = synthetic_vector(assembler.obs_size());
        let mirrored = map.apply_obs(&stacked);
        assert_eq!(mirrored.len(), stacked.len());
        // Mirroring each frame separately must agree with mirroring the
        // stack.
        let frame = assembler.frame_size();
        for f in 0..3 {
            let per_frame = map.apply_obs(&stacked[f * frame..(f + 1) * frame]);
            assert_eq!(&mirrored[f * frame..(f + 1) * frame], per_frame.as_slice());
        }
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(
            ObservationAssembler::new(true, PhaseDescriptor::Clock, 0).frame_size(),
            49
        );
        assert_eq!(
            ObservationAssembler::new(true, PhaseDescriptor::ReferenceSlice, 0).frame_size(),
            86
        );
        assert_eq!(
            ObservationAssembler::new(false, PhaseDescriptor::SegmentSummary, 0).frame_size(),
            58
        );
    }

    #[test]
    fn test_history_ring_most_recent_first() {
        let mut assembler = ObservationAssembler::new(true, PhaseDescriptor::Clock, 1);
        let sensor = SensorState::default();
        let qpos = vec![0.0; crate::types::QPOS_LEN];
        let qvel = vec![0.0; crate::types::QVEL_LEN];

        let inputs = |speed: f64| ObservationInputs {
            sensor: &sensor,
            qpos: &qpos,
            qvel: &qvel,
            orient_add: 0.0,
            joint_offsets: None,
            descriptor: DescriptorInputs::Clock {
                phase: 0,
                phaselen: 30,
                speed,
            },
        };

        let first = assembler.assemble(&inputs(1.0));
        // Oldest frame is still the zero initialization.
        let frame = assembler.frame_size();
        assert!(first[frame..].iter().all(|v| *v == 0.0));

        let second = assembler.assemble(&inputs(2.0));
        // Speed of the newest frame sits at the descriptor tail.
        assert_eq!(second[frame - 1], 2.0);
        assert_eq!(second[2 * frame - 1], 1.0);
    }

    #[test]
    fn test_yaw_correction_cancels_commanded_heading() {
        let mut assembler = ObservationAssembler::new(true, PhaseDescriptor::Clock, 0);
        let yaw = 0.7;
        let q = DQuat::from_rotation_z(yaw);
        let mut sensor = SensorState::default();
        sensor.pelvis.orientation = [q.w, q.x, q.y, q.z];
        sensor.pelvis.translational_velocity = [1.0, 0.0, 0.0];

        let qpos = vec![0.0; crate::types::QPOS_LEN];
        let qvel = vec![0.0; crate::types::QVEL_LEN];
        let obs = assembler.assemble(&ObservationInputs {
            sensor: &sensor,
            qpos: &qpos,
            qvel: &qvel,
            orient_add: yaw,
            joint_offsets: None,
            descriptor: DescriptorInputs::Clock {
                phase: 0,
                phaselen: 30,
                speed: 0.0,
            },
        });

        // Corrected orientation is identity (w = 1), scalar part
        // non-negative.
        assert!((obs[1] - 1.0).abs() < 1e-9);
        assert!(obs[2].abs() < 1e-9 && obs[4].abs() < 1e-9);
        // Velocity rotates back into the command frame: forward component
        // restored.
        let v = &obs[15..18];
        assert!((v[0] - yaw.cos()).abs() < 1e-9);
        assert!((v[1] + yaw.sin()).abs() < 1e-9);
    }
}
