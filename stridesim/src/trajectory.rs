// src/trajectory.rs
//
// Reference gait trajectories and phase-indexed lookup.
//
// A trajectory is an immutable sequence of (qpos, qvel) samples covering
// exactly one gait cycle. Two indexing modes exist:
// - TimeIndexed: samples recorded at the physics rate; a control-step
//   phase maps to sample `phase * simrate`.
// - SegmentIndexed: pre-segmented samples, one per phase, belonging to a
//   family keyed by discrete commanded speed.
//
// Loading trajectory files from disk is a boundary concern; this module
// only consumes in-memory sample arrays and provides deterministic
// synthetic gaits for the harness and tests.

use serde::{Deserialize, Serialize};

use crate::types::{ConfigError, MOTOR_POS_IDX, QPOS_LEN, QVEL_LEN};

/// One reference pose/velocity pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSample {
    pub qpos: Vec<f64>,
    pub qvel: Vec<f64>,
}

/// How control-step phases map to sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrajectoryMode {
    /// Samples at the physics rate; `simrate` samples per phase.
    TimeIndexed { simrate: usize },
    /// One sample per phase.
    SegmentIndexed,
}

/// Width of the segment global-state summary: left foot, right foot and
/// center of mass, position + velocity each.
pub const SUMMARY_WIDTH: usize = 18;

/// Immutable reference trajectory for one gait cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrajectory {
    samples: Vec<ReferenceSample>,
    mode: TrajectoryMode,
    /// Per-sample global-state summaries, recorded only for segment
    /// trajectories.
    summaries: Option<Vec<[f64; SUMMARY_WIDTH]>>,
}

impl ReferenceTrajectory {
    /// Build from sample arrays, validating widths up front.
    pub fn from_samples(
        samples: Vec<ReferenceSample>,
        mode: TrajectoryMode,
    ) -> Result<Self, ConfigError> {
        if samples.is_empty() {
            return Err(ConfigError::EmptyTrajectory);
        }
        for s in &samples {
            if s.qpos.len() != QPOS_LEN {
                return Err(ConfigError::SampleWidthMismatch {
                    expected: QPOS_LEN,
                    got: s.qpos.len(),
                });
            }
            if s.qvel.len() != QVEL_LEN {
                return Err(ConfigError::SampleWidthMismatch {
                    expected: QVEL_LEN,
                    got: s.qvel.len(),
                });
            }
        }
        match mode {
            TrajectoryMode::TimeIndexed { simrate } => {
                if simrate == 0 || samples.len() / simrate < 2 {
                    return Err(ConfigError::EmptyTrajectory);
                }
            }
            TrajectoryMode::SegmentIndexed => {
                // A cycle needs at least two phases to advance through.
                if samples.len() < 2 {
                    return Err(ConfigError::EmptyTrajectory);
                }
            }
        }
        Ok(Self {
            samples,
            mode,
            summaries: None,
        })
    }

    /// Attach a per-sample global-state summary track.
    pub fn with_summaries(
        mut self,
        summaries: Vec<[f64; SUMMARY_WIDTH]>,
    ) -> Result<Self, ConfigError> {
        if summaries.len() != self.samples.len() {
            return Err(ConfigError::SampleWidthMismatch {
                expected: self.samples.len(),
                got: summaries.len(),
            });
        }
        self.summaries = Some(summaries);
        Ok(self)
    }

    pub fn has_summaries(&self) -> bool {
        self.summaries.is_some()
    }

    /// Global-state summary at `phase` (clamped like `lookup`).
    pub fn segment_summary(&self, phase: usize) -> Option<[f64; SUMMARY_WIDTH]> {
        let summaries = self.summaries.as_ref()?;
        let phase = if phase > self.phaselen() { 0 } else { phase };
        let ind = match self.mode {
            TrajectoryMode::TimeIndexed { simrate } => phase * simrate,
            TrajectoryMode::SegmentIndexed => phase,
        };
        Some(summaries[ind])
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mode(&self) -> TrajectoryMode {
        self.mode
    }

    /// Number of control-step phases in one cycle.
    ///
    /// Deliberately conservative for time-indexed data: wrapping a cycle
    /// past its recorded end produces asymmetric gaits, so the last
    /// partial control step is dropped.
    pub fn phaselen(&self) -> usize {
        match self.mode {
            TrajectoryMode::TimeIndexed { simrate } => self.samples.len() / simrate - 1,
            TrajectoryMode::SegmentIndexed => self.samples.len() - 1,
        }
    }

    /// Forward distance covered by one cycle, before speed scaling.
    pub fn span(&self) -> f64 {
        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];
        last.qpos[0] - first.qpos[0]
    }

    /// Reference state for `phase`, scaled for the commanded speed and
    /// shifted forward by the completed cycle count.
    ///
    /// Phases past `phaselen` clamp to 0. Fractional sample indices do
    /// not arise for integer phases; the contract is nearest-sample
    /// truncation, not interpolation, and callers must not rely on
    /// smoothing between samples.
    ///
    /// The lateral position is forced to zero: references command
    /// straight-line walking only.
    pub fn lookup(&self, phase: usize, speed: f64, counter: u32) -> (Vec<f64>, Vec<f64>) {
        let phase = if phase > self.phaselen() { 0 } else { phase };
        let ind = match self.mode {
            TrajectoryMode::TimeIndexed { simrate } => phase * simrate,
            TrajectoryMode::SegmentIndexed => phase,
        };

        let mut pos = self.samples[ind].qpos.clone();
        let mut vel = self.samples[ind].qvel.clone();

        match self.mode {
            TrajectoryMode::TimeIndexed { .. } => {
                pos[0] *= speed;
                pos[0] += self.span() * counter as f64 * speed;
                vel[0] *= speed;
            }
            TrajectoryMode::SegmentIndexed => {
                // Segment samples already encode absolute progress for
                // their recorded speed; only the cycle offset is added.
                pos[0] += self.span() * counter as f64;
            }
        }

        pos[1] = 0.0;

        (pos, vel)
    }

    /// Reference pose restricted to the ten actuated motors.
    pub fn motor_pose(&self, phase: usize) -> [f64; 10] {
        let (pos, _) = self.lookup(phase, 1.0, 0);
        let mut out = [0.0; 10];
        for (i, &idx) in MOTOR_POS_IDX.iter().enumerate() {
            out[i] = pos[idx];
        }
        out
    }
}

/// Segment-indexed trajectory family keyed by discrete commanded speed.
#[derive(Debug, Clone)]
pub struct SegmentFamily {
    speeds: Vec<f64>,
    trajectories: Vec<ReferenceTrajectory>,
}

impl SegmentFamily {
    pub fn new(
        speeds: Vec<f64>,
        trajectories: Vec<ReferenceTrajectory>,
    ) -> Result<Self, ConfigError> {
        if speeds.is_empty() || speeds.len() != trajectories.len() {
            return Err(ConfigError::EmptyTrajectory);
        }
        Ok(Self {
            speeds,
            trajectories,
        })
    }

    pub fn num_speeds(&self) -> usize {
        self.speeds.len()
    }

    pub fn speed(&self, idx: usize) -> f64 {
        self.speeds[idx]
    }

    pub fn trajectory(&self, idx: usize) -> &ReferenceTrajectory {
        &self.trajectories[idx]
    }

    /// Index of the trajectory recorded closest to `speed`.
    pub fn nearest_index(&self, speed: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, s) in self.speeds.iter().enumerate() {
            let d = (s - speed).abs();
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }
}

/// Deterministic synthetic walking gait at the physics rate.
///
/// Stands in for recorded trajectory data in the harness and tests: the
/// pelvis advances linearly while the motors oscillate around the
/// neutral standing pose with opposite left/right phase.
pub fn synthetic_walking(cycle_samples: usize, simrate: usize) -> ReferenceTrajectory {
    let neutral = [0.0045, 0.0, 0.4973, -1.1997, -1.5968];
    let span = 0.9;
    let mut samples = Vec::with_capacity(cycle_samples);

    for k in 0..cycle_samples {
        let t = k as f64 / cycle_samples as f64;
        let omega = 2.0 * std::f64::consts::PI;

        let mut qpos = vec![0.0; QPOS_LEN];
        let mut qvel = vec![0.0; QVEL_LEN];
        qpos[0] = span * t;
        qpos[2] = 1.01 + 0.01 * (2.0 * omega * t).sin();
        qpos[3] = 1.0;
        qvel[0] = span;

        for leg in 0..2 {
            // Opposite swing phase per leg.
            let leg_phase = omega * t + leg as f64 * std::f64::consts::PI;
            for i in 0..5 {
                let amp = match i {
                    2 => 0.25,  // hip pitch
                    3 => 0.35,  // knee
                    4 => 0.15,  // foot
                    _ => 0.02,  // hip roll / yaw barely move
                };
                qpos[MOTOR_POS_IDX[leg * 5 + i]] = neutral[i] + amp * leg_phase.sin();
            }
        }
        // Passive linkage holds its standing configuration.
        qpos[15] = 0.0;
        qpos[16] = 1.4267;
        qpos[29] = 0.0;
        qpos[30] = 1.4267;

        samples.push(ReferenceSample { qpos, qvel });
    }

    ReferenceTrajectory::from_samples(samples, TrajectoryMode::TimeIndexed { simrate })
        .expect("synthetic trajectory is well formed")
}

/// Deterministic segment family over the standard commanded-speed grid
/// (0.0 to 2.0 in 0.1 steps).
pub fn synthetic_segment_family(phases: usize) -> SegmentFamily {
    let speeds: Vec<f64> = (0..=20).map(|x| x as f64 / 10.0).collect();
    let trajectories = speeds
        .iter()
        .map(|&speed| {
            let mut samples = Vec::with_capacity(phases);
            let mut summaries = Vec::with_capacity(phases);
            for k in 0..phases {
                let t = k as f64 / phases as f64;
                let mut qpos = vec![0.0; QPOS_LEN];
                let mut qvel = vec![0.0; QVEL_LEN];
                qpos[0] = speed * 0.7 * t;
                qpos[2] = 1.01;
                qpos[3] = 1.0;
                qvel[0] = speed;
                let neutral = [0.0045, 0.0, 0.4973, -1.1997, -1.5968];
                for leg in 0..2 {
                    let leg_phase = 2.0 * std::f64::consts::PI * t
                        + leg as f64 * std::f64::consts::PI;
                    for i in 0..5 {
                        let amp = if i >= 2 { 0.2 * (0.2 + speed) } else { 0.02 };
                        qpos[MOTOR_POS_IDX[leg * 5 + i]] = neutral[i] + amp * leg_phase.sin();
                    }
                }

                // Summary track: feet swing in antiphase around the
                // pelvis, center of mass follows the pelvis.
                let omega = 2.0 * std::f64::consts::PI;
                let stride = 0.18 * (0.2 + speed);
                let lift = 0.08 * (0.2 + speed);
                let mut summary = [0.0; SUMMARY_WIDTH];
                for (leg, base) in [(0usize, 0usize), (1, 6)] {
                    let leg_phase = omega * t + leg as f64 * std::f64::consts::PI;
                    let side = if leg == 0 { 0.135 } else { -0.135 };
                    summary[base] = stride * leg_phase.sin();
                    summary[base + 1] = side;
                    summary[base + 2] = -1.0 + lift * leg_phase.cos().max(0.0);
                    summary[base + 3] = stride * omega * leg_phase.cos();
                    summary[base + 4] = 0.0;
                    summary[base + 5] = -lift * omega * leg_phase.sin().max(0.0);
                }
                summary[12] = qpos[0];
                summary[13] = 0.0;
                summary[14] = qpos[2];
                summary[15] = qvel[0];
                summary[16] = 0.0;
                summary[17] = 0.0;

                samples.push(ReferenceSample { qpos, qvel });
                summaries.push(summary);
            }
            ReferenceTrajectory::from_samples(samples, TrajectoryMode::SegmentIndexed)
                .expect("synthetic segment is well formed")
                .with_summaries(summaries)
                .expect("summary track matches sample count")
        })
        .collect();

    SegmentFamily::new(speeds, trajectories).expect("synthetic family is well formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lateral_position_always_zero() {
        let traj = synthetic_walking(1700, 50);
        for phase in 0..=traj.phaselen() {
            let (pos, _) = traj.lookup(phase, 1.0, 0);
            assert_eq!(pos[1], 0.0, "lateral reference must stay zero");
        }
    }

    #[test]
    fn test_phaselen_drops_partial_control_step() {
        let traj = synthetic_walking(1700, 50);
        // 1700 / 50 = 34 full control steps; the last is dropped.
        assert_eq!(traj.phaselen(), 33);
    }

    #[test]
    fn test_overflow_phase_clamps_to_zero() {
        let traj = synthetic_walking(1700, 50);
        let (pos_over, vel_over) = traj.lookup(traj.phaselen() + 7, 1.0, 0);
        let (pos_zero, vel_zero) = traj.lookup(0, 1.0, 0);
        assert_eq!(pos_over, pos_zero);
        assert_eq!(vel_over, vel_zero);
    }

    #[test]
    fn test_cycle_offset_scales_with_speed() {
        let traj = synthetic_walking(1700, 50);
        let speed = 1.3;
        let (pos0, _) = traj.lookup(0, speed, 0);
        let (pos1, _) = traj.lookup(0, speed, 1);
        let advanced = pos1[0] - pos0[0];
        assert!((advanced - traj.span() * speed).abs() < 1e-9);
    }

    #[test]
    fn test_segment_offset_ignores_speed_multiplier() {
        let family = synthetic_segment_family(28);
        let traj = family.trajectory(family.nearest_index(1.0));
        let (pos0, _) = traj.lookup(0, 1.0, 0);
        let (pos1, _) = traj.lookup(0, 1.0, 1);
        assert!((pos1[0] - pos0[0] - traj.span()).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_speed_index() {
        let family = synthetic_segment_family(28);
        assert_eq!(family.nearest_index(0.0), 0);
        assert_eq!(family.nearest_index(1.04), 10);
        assert_eq!(family.nearest_index(5.0), 20);
    }

    #[test]
    fn test_sample_width_validated() {
        let bad = vec![ReferenceSample {
            qpos: vec![0.0; 3],
            qvel: vec![0.0; QVEL_LEN],
        }];
        let err = ReferenceTrajectory::from_samples(bad, TrajectoryMode::SegmentIndexed);
        assert!(matches!(
            err,
            Err(ConfigError::SampleWidthMismatch { expected: 35, .. })
        ));
    }
}
