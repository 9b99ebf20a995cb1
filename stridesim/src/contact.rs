// src/contact.rs
//
// Per-foot contact state machine and per-control-step accumulators.
//
// Two edge-triggered hysteresis flags per foot:
// - `high`: set once the foot clears 0.2 m, cleared (and the shared step
//   counter incremented) on the next contact-force event.
// - `swing`: set once the foot clears the ground, cleared on the next
//   contact-force event.
// A foot resting on the ground under sustained force does not re-trigger
// either flag until it has left and returned.
//
// Each foot's flags key on that foot's own force reading.
//
// Force, position, velocity and flat-orientation cost are summed over the
// `simrate` physics sub-steps of one control step and averaged at the end
// of the step for the reward functions.

use serde::{Deserialize, Serialize};

use crate::types::{NEUTRAL_FOOT_ORIENT, SUBSTEP_DT};

/// Foot height that arms the `high` flag.
const HIGH_HEIGHT: f64 = 0.2;

/// Foot height that arms the `swing` flag.
const SWING_HEIGHT: f64 = 0.0;

/// Per-foot averages over one control step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactAverages {
    pub force: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub orient_cost: f64,
}

/// Hysteresis flags and accumulators for one foot.
#[derive(Debug, Clone, Copy, Default)]
struct FootContact {
    high: bool,
    swing: bool,
    force_acc: f64,
    position_acc: [f64; 3],
    velocity_acc: [f64; 3],
    orient_cost_acc: f64,
    prev_position: [f64; 3],
}

impl FootContact {
    /// Returns true when a contact-force event closed a `high` stride.
    fn update_flags(&mut self, height: f64, force: f64) -> bool {
        let mut step_completed = false;
        if self.high && force > 0.0 {
            self.high = false;
            step_completed = true;
        } else if !self.high && height >= HIGH_HEIGHT {
            self.high = true;
        }

        if self.swing && force > 0.0 {
            self.swing = false;
        } else if !self.swing && height >= SWING_HEIGHT {
            self.swing = true;
        }
        step_completed
    }

    fn accumulate(&mut self, position: [f64; 3], force: f64, quat: [f64; 4]) {
        let velocity = [
            (position[0] - self.prev_position[0]) / SUBSTEP_DT,
            (position[1] - self.prev_position[1]) / SUBSTEP_DT,
            (position[2] - self.prev_position[2]) / SUBSTEP_DT,
        ];
        self.prev_position = position;

        self.force_acc += force;
        for i in 0..3 {
            self.position_acc[i] += position[i];
            self.velocity_acc[i] += velocity[i];
        }
        let inner: f64 = NEUTRAL_FOOT_ORIENT
            .iter()
            .zip(quat.iter())
            .map(|(a, b)| a * b)
            .sum();
        self.orient_cost_acc += 1.0 - inner * inner;
    }

    fn clear_accumulators(&mut self) {
        self.force_acc = 0.0;
        self.position_acc = [0.0; 3];
        self.velocity_acc = [0.0; 3];
        self.orient_cost_acc = 0.0;
    }

    fn averages(&self, simrate: usize) -> ContactAverages {
        let n = simrate as f64;
        ContactAverages {
            force: self.force_acc / n,
            position: [
                self.position_acc[0] / n,
                self.position_acc[1] / n,
                self.position_acc[2] / n,
            ],
            velocity: [
                self.velocity_acc[0] / n,
                self.velocity_acc[1] / n,
                self.velocity_acc[2] / n,
            ],
            orient_cost: self.orient_cost_acc / n,
        }
    }
}

/// Tracks both feet across the sub-steps of a control step.
#[derive(Debug, Clone)]
pub struct ContactStateTracker {
    left: FootContact,
    right: FootContact,
    step_count: u32,
    simrate: usize,
}

impl ContactStateTracker {
    pub fn new(simrate: usize) -> Self {
        Self {
            left: FootContact::default(),
            right: FootContact::default(),
            step_count: 0,
            simrate,
        }
    }

    /// Clear flags, counters and accumulators for a new episode, seeding
    /// the velocity differencer with the current foot positions.
    pub fn reset(&mut self, foot_positions: [f64; 6]) {
        self.left = FootContact {
            prev_position: [foot_positions[0], foot_positions[1], foot_positions[2]],
            ..FootContact::default()
        };
        self.right = FootContact {
            prev_position: [foot_positions[3], foot_positions[4], foot_positions[5]],
            ..FootContact::default()
        };
        self.step_count = 0;
    }

    /// Zero the accumulators at the start of a control step. Flags
    /// persist until their hysteresis condition fires.
    pub fn begin_control_step(&mut self) {
        self.left.clear_accumulators();
        self.right.clear_accumulators();
    }

    /// Feed one physics sub-step of foot state.
    pub fn observe_substep(
        &mut self,
        foot_positions: [f64; 6],
        forces: [f64; 2],
        left_quat: [f64; 4],
        right_quat: [f64; 4],
    ) {
        let left_pos = [foot_positions[0], foot_positions[1], foot_positions[2]];
        let right_pos = [foot_positions[3], foot_positions[4], foot_positions[5]];

        if self.left.update_flags(left_pos[2], forces[0]) {
            self.step_count += 1;
        }
        if self.right.update_flags(right_pos[2], forces[1]) {
            self.step_count += 1;
        }

        self.left.accumulate(left_pos, forces[0], left_quat);
        self.right.accumulate(right_pos, forces[1], right_quat);
    }

    /// Average the accumulators over the control step.
    pub fn finish_control_step(&self) -> (ContactAverages, ContactAverages) {
        (
            self.left.averages(self.simrate),
            self.right.averages(self.simrate),
        )
    }

    /// Completed strides (high-arc steps that returned to ground).
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn left_high(&self) -> bool {
        self.left.high
    }

    pub fn right_high(&self) -> bool {
        self.right.high
    }

    pub fn left_swing(&self) -> bool {
        self.left.swing
    }

    pub fn right_swing(&self) -> bool {
        self.right.swing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEUTRAL: [f64; 4] = NEUTRAL_FOOT_ORIENT;

    fn observe_left(tracker: &mut ContactStateTracker, height: f64, force: f64) {
        tracker.observe_substep(
            [0.0, 0.135, height, 0.0, -0.135, 0.0],
            [force, 0.0],
            NEUTRAL,
            NEUTRAL,
        );
    }

    #[test]
    fn test_high_flag_fires_exactly_once() {
        let mut tracker = ContactStateTracker::new(4);
        tracker.reset([0.0, 0.135, 0.0, 0.0, -0.135, 0.0]);
        tracker.begin_control_step();

        let heights = [0.0, 0.25, 0.25, 0.0];
        let forces = [0.0, 0.0, 5.0, 0.0];

        let mut transitions = Vec::new();
        for (h, f) in heights.iter().zip(forces.iter()) {
            let before = tracker.left_high();
            observe_left(&mut tracker, *h, *f);
            if tracker.left_high() != before {
                transitions.push((before, tracker.left_high()));
            }
        }

        assert_eq!(transitions, vec![(false, true), (true, false)]);
        assert_eq!(tracker.step_count(), 1);
    }

    #[test]
    fn test_sustained_force_does_not_retrigger() {
        let mut tracker = ContactStateTracker::new(4);
        tracker.reset([0.0, 0.135, 0.0, 0.0, -0.135, 0.0]);
        tracker.begin_control_step();

        observe_left(&mut tracker, 0.25, 0.0);
        observe_left(&mut tracker, 0.0, 400.0);
        assert_eq!(tracker.step_count(), 1);

        // Foot stays planted under load: no further step events.
        observe_left(&mut tracker, 0.0, 400.0);
        observe_left(&mut tracker, 0.0, 400.0);
        assert_eq!(tracker.step_count(), 1);
        assert!(!tracker.left_high());
    }

    #[test]
    fn test_each_foot_keys_on_its_own_force() {
        let mut tracker = ContactStateTracker::new(4);
        tracker.reset([0.0, 0.135, 0.0, 0.0, -0.135, 0.0]);
        tracker.begin_control_step();

        // Right foot rises; only left-foot force arrives. The right
        // flag must stay armed.
        tracker.observe_substep(
            [0.0, 0.135, 0.0, 0.0, -0.135, 0.25],
            [0.0, 0.0],
            NEUTRAL,
            NEUTRAL,
        );
        assert!(tracker.right_high());

        tracker.observe_substep(
            [0.0, 0.135, 0.0, 0.0, -0.135, 0.25],
            [400.0, 0.0],
            NEUTRAL,
            NEUTRAL,
        );
        assert!(tracker.right_high(), "left-foot force must not clear the right flag");
        assert_eq!(tracker.step_count(), 0);

        tracker.observe_substep(
            [0.0, 0.135, 0.0, 0.0, -0.135, 0.0],
            [0.0, 400.0],
            NEUTRAL,
            NEUTRAL,
        );
        assert!(!tracker.right_high());
        assert_eq!(tracker.step_count(), 1);
    }

    #[test]
    fn test_accumulators_average_over_simrate() {
        let simrate = 4;
        let mut tracker = ContactStateTracker::new(simrate);
        tracker.reset([0.0, 0.135, 0.0, 0.0, -0.135, 0.0]);
        tracker.begin_control_step();

        for _ in 0..simrate {
            tracker.observe_substep(
                [0.0, 0.135, 0.0, 0.0, -0.135, 0.0],
                [100.0, 300.0],
                NEUTRAL,
                NEUTRAL,
            );
        }

        let (left, right) = tracker.finish_control_step();
        assert!((left.force - 100.0).abs() < 1e-12);
        assert!((right.force - 300.0).abs() < 1e-12);
        assert!((left.orient_cost - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_begin_control_step_preserves_flags() {
        let mut tracker = ContactStateTracker::new(4);
        tracker.reset([0.0, 0.135, 0.0, 0.0, -0.135, 0.0]);
        tracker.begin_control_step();
        observe_left(&mut tracker, 0.25, 0.0);
        assert!(tracker.left_high());

        tracker.begin_control_step();
        assert!(tracker.left_high(), "flags persist across control steps");
        let (left, _) = tracker.finish_control_step();
        assert_eq!(left.force, 0.0, "accumulators are zeroed");
    }
}
