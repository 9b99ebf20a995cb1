// src/action.rs
//
// Policy action to low-level PD target mapping.
//
// The policy emits joint-space deltas; the mapper adds the active offset
// pose (a fixed neutral crouch, or the current reference pose when the
// offset tracks the trajectory), subtracts the episode's randomized
// joint trims, and fills the PD command. Pure position control: feed-forward
// torque and velocity targets are always zero.
//
// With gain learning the action widens to 30: ten pose targets followed
// by twenty gain deltas (5 P per leg, then 5 D per leg) applied around
// the default gains.

use crate::randomize::{NUM_GAIN_DELTAS, NUM_JOINT_OFFSETS};
use crate::types::{GAINS_PER_LEG, LegPdTargets, NUM_MOTORS, PdTargets};

/// Default proportional gains per leg (hip roll, hip yaw, hip pitch,
/// knee, foot).
pub const DEFAULT_P_GAIN: [f64; GAINS_PER_LEG] = [100.0, 100.0, 88.0, 96.0, 50.0];

/// Default derivative gains per leg.
pub const DEFAULT_D_GAIN: [f64; GAINS_PER_LEG] = [10.0, 10.0, 8.0, 9.6, 5.0];

/// Neutral standing pose over the ten motors, left leg then right leg.
pub const NEUTRAL_POSE: [f64; NUM_MOTORS] = [
    0.0045, 0.0, 0.4973, -1.1997, -1.5968, 0.0045, 0.0, 0.4973, -1.1997, -1.5968,
];

/// Maps a policy action onto PD targets for the physics backend.
#[derive(Debug, Clone, Copy)]
pub struct ActionTargetMapper {
    no_delta: bool,
    learn_gains: bool,
}

impl ActionTargetMapper {
    pub fn new(no_delta: bool, learn_gains: bool) -> Self {
        Self {
            no_delta,
            learn_gains,
        }
    }

    /// Width of the action vector this mapper consumes.
    pub fn action_width(&self) -> usize {
        if self.learn_gains {
            NUM_MOTORS + NUM_GAIN_DELTAS
        } else {
            NUM_MOTORS
        }
    }

    /// Build the PD command for one control step.
    ///
    /// Deterministic and side-effect free: identical inputs produce a
    /// bit-identical command.
    pub fn compute_targets(
        &self,
        action: &[f64],
        reference_pose: &[f64; NUM_MOTORS],
        joint_offsets: Option<&[f64; NUM_JOINT_OFFSETS]>,
        sampled_gain_deltas: Option<&[f64; NUM_GAIN_DELTAS]>,
    ) -> PdTargets {
        assert_eq!(
            action.len(),
            self.action_width(),
            "action width must match the configured mapper"
        );

        let offset: &[f64; NUM_MOTORS] = if self.no_delta {
            &NEUTRAL_POSE
        } else {
            reference_pose
        };

        let mut target = [0.0; NUM_MOTORS];
        for i in 0..NUM_MOTORS {
            target[i] = action[i] + offset[i];
        }
        if let Some(offsets) = joint_offsets {
            for i in 0..NUM_MOTORS {
                target[i] -= offsets[i];
            }
        }

        let learned: Option<&[f64]> = if self.learn_gains {
            Some(&action[NUM_MOTORS..])
        } else {
            None
        };

        // Learned deltas from the action and sampled per-episode deltas
        // both perturb the default gains; they compose additively.
        let mut deltas = [0.0; NUM_GAIN_DELTAS];
        if let Some(g) = learned {
            for (d, v) in deltas.iter_mut().zip(g.iter()) {
                *d += v;
            }
        }
        if let Some(g) = sampled_gain_deltas {
            for (d, v) in deltas.iter_mut().zip(g.iter()) {
                *d += v;
            }
        }

        let mut left = LegPdTargets::default();
        let mut right = LegPdTargets::default();
        for i in 0..GAINS_PER_LEG {
            let (dp_l, dp_r, dd_l, dd_r) = (
                deltas[i],
                deltas[GAINS_PER_LEG + i],
                deltas[2 * GAINS_PER_LEG + i],
                deltas[3 * GAINS_PER_LEG + i],
            );

            left.p_gain[i] = DEFAULT_P_GAIN[i] + dp_l;
            right.p_gain[i] = DEFAULT_P_GAIN[i] + dp_r;
            left.d_gain[i] = DEFAULT_D_GAIN[i] + dd_l;
            right.d_gain[i] = DEFAULT_D_GAIN[i] + dd_r;

            left.p_target[i] = target[i];
            right.p_target[i] = target[GAINS_PER_LEG + i];
            // Pure position PD.
            left.torque[i] = 0.0;
            right.torque[i] = 0.0;
            left.d_target[i] = 0.0;
            right.d_target[i] = 0.0;
        }

        PdTargets { left, right }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_targets_bit_identical() {
        let mapper = ActionTargetMapper::new(true, false);
        let action = [0.01, -0.02, 0.3, -0.4, 0.05, 0.01, -0.02, 0.3, -0.4, 0.05];
        let reference = NEUTRAL_POSE;
        let offsets = [0.015; NUM_JOINT_OFFSETS];

        let a = mapper.compute_targets(&action, &reference, Some(&offsets), None);
        let b = mapper.compute_targets(&action, &reference, Some(&offsets), None);

        assert_eq!(a, b);
    }

    #[test]
    fn test_no_delta_uses_neutral_pose() {
        let mapper = ActionTargetMapper::new(true, false);
        let action = [0.0; NUM_MOTORS];
        let mut reference = NEUTRAL_POSE;
        reference[2] += 1.0; // would shift the target in reference mode

        let targets = mapper.compute_targets(&action, &reference, None, None);
        assert_eq!(targets.left.p_target[2], NEUTRAL_POSE[2]);
    }

    #[test]
    fn test_reference_mode_tracks_reference_pose() {
        let mapper = ActionTargetMapper::new(false, false);
        let action = [0.0; NUM_MOTORS];
        let mut reference = NEUTRAL_POSE;
        reference[7] = 0.75;

        let targets = mapper.compute_targets(&action, &reference, None, None);
        assert_eq!(targets.right.p_target[2], 0.75);
    }

    #[test]
    fn test_joint_offsets_subtract_from_target() {
        let mapper = ActionTargetMapper::new(true, false);
        let action = [0.0; NUM_MOTORS];
        let mut offsets = [0.0; NUM_JOINT_OFFSETS];
        offsets[0] = 0.02;

        let targets = mapper.compute_targets(&action, &NEUTRAL_POSE, Some(&offsets), None);
        assert!((targets.left.p_target[0] - (NEUTRAL_POSE[0] - 0.02)).abs() < 1e-15);
    }

    #[test]
    fn test_learned_gain_split() {
        let mapper = ActionTargetMapper::new(true, true);
        let mut action = vec![0.0; 30];
        action[10] = 2.0; // left P hip roll
        action[16] = -3.0; // right P hip yaw
        action[20] = 0.5; // left D hip roll
        action[29] = -0.5; // right D foot

        let targets = mapper.compute_targets(&action, &NEUTRAL_POSE, None, None);
        assert_eq!(targets.left.p_gain[0], DEFAULT_P_GAIN[0] + 2.0);
        assert_eq!(targets.right.p_gain[1], DEFAULT_P_GAIN[1] - 3.0);
        assert_eq!(targets.left.d_gain[0], DEFAULT_D_GAIN[0] + 0.5);
        assert_eq!(targets.right.d_gain[4], DEFAULT_D_GAIN[4] - 0.5);
    }

    #[test]
    fn test_feedforward_and_velocity_targets_zero() {
        let mapper = ActionTargetMapper::new(true, false);
        let action = [0.1; NUM_MOTORS];
        let targets = mapper.compute_targets(&action, &NEUTRAL_POSE, None, None);
        assert_eq!(targets.left.torque, [0.0; 5]);
        assert_eq!(targets.right.d_target, [0.0; 5]);
    }
}
