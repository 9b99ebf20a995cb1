// src/reward.rs
//
// Pluggable reward strategies.
//
// The variant tag is resolved to a tagged enum exactly once, at
// construction; unknown tags are configuration errors. Every variant is
// a pure function of the kinematic state, the per-control-step contact
// averages, the commanded speed and the reference state, returns a
// finite score in [0, 1], and publishes the early-termination cutoff the
// episode controller applies to that score.
//
// Clock-family variants additionally consume a per-foot phase-indexed
// stance-weight table. Tables normally arrive from outside (they are
// boundary data, one per gait and speed bucket); the generators below
// produce the smooth and strict families for harness use.

use serde::{Deserialize, Serialize};

use crate::contact::ContactAverages;
use crate::trajectory::SUMMARY_WIDTH;
use crate::types::{ConfigError, MOTOR_POS_IDX, SPRING_POS_IDX};

/// Reward variant, resolved from the configuration tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardVariant {
    /// Clock-driven stance/swing shaping plus speed tracking.
    Clock,
    /// Clock shaping plus center-of-mass tracking against a segment
    /// reference.
    AslipClock,
    /// Clock shaping that rewards maximum forward velocity.
    MaxVelClock,
    /// Legacy segment tracking: center of mass and foot placement.
    AslipOld,
    /// Reference tracking reward from the conference-paper formulation.
    IrosPaper,
    /// Pure speed-matching reward.
    Speed,
}

impl RewardVariant {
    /// Resolve a configuration tag. Dotted family names select the same
    /// variant as their stem; the suffix picks the clock table shape.
    pub fn parse(tag: &str) -> Result<RewardVariant, ConfigError> {
        let t = tag.trim();
        if t == "clock" || t.starts_with("clock_") {
            return Ok(RewardVariant::Clock);
        }
        if t == "aslip_clock" || t.starts_with("aslip_clock_") {
            return Ok(RewardVariant::AslipClock);
        }
        if t == "max_vel_clock" || t.starts_with("max_vel_clock_") {
            return Ok(RewardVariant::MaxVelClock);
        }
        match t {
            "aslip_old" => Ok(RewardVariant::AslipOld),
            "iros_paper" => Ok(RewardVariant::IrosPaper),
            "speed" | "fixed_speed_reward" | "5k_speed_reward" => Ok(RewardVariant::Speed),
            other => Err(ConfigError::UnknownRewardTag(other.to_string())),
        }
    }

    /// Whether this variant consumes clock tables.
    pub fn is_clock_family(&self) -> bool {
        matches!(
            self,
            RewardVariant::Clock | RewardVariant::AslipClock | RewardVariant::MaxVelClock
        )
    }

    /// Early-termination cutoff published alongside the score.
    pub fn early_term_cutoff(&self) -> f64 {
        match self {
            RewardVariant::Clock | RewardVariant::AslipClock | RewardVariant::MaxVelClock => 0.2,
            RewardVariant::AslipOld => 0.0,
            RewardVariant::IrosPaper | RewardVariant::Speed => 0.3,
        }
    }
}

/// Phase-indexed stance weight for one foot. Weight 1 commands stance,
/// weight 0 commands swing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockTable {
    weights: Vec<f64>,
}

impl ClockTable {
    pub fn new(weights: Vec<f64>, phaselen: usize) -> Result<Self, ConfigError> {
        if weights.len() < phaselen + 1 {
            return Err(ConfigError::ClockTableTooShort {
                needed: phaselen + 1,
                got: weights.len(),
            });
        }
        Ok(Self { weights })
    }

    /// Stance weight at `phase`, clamped into the table.
    pub fn stance_weight(&self, phase: usize) -> f64 {
        let idx = phase.min(self.weights.len() - 1);
        self.weights[idx].clamp(0.0, 1.0)
    }

    /// Smooth sinusoidal table: stance weight rises and falls over one
    /// cycle, offset by `offset` cycle fractions.
    pub fn smooth(phaselen: usize, offset: f64) -> Self {
        let weights = (0..=phaselen)
            .map(|p| {
                let t = p as f64 / phaselen as f64 - offset;
                0.5 * (1.0 + (2.0 * std::f64::consts::PI * t).cos())
            })
            .collect();
        Self { weights }
    }

    /// Near-binary table with linear transitions of `transition` cycle
    /// fractions between full stance and full swing.
    pub fn strict(phaselen: usize, offset: f64, transition: f64) -> Self {
        let weights = (0..=phaselen)
            .map(|p| {
                let mut t = p as f64 / phaselen as f64 - offset;
                t -= t.floor();
                // Stance occupies the first half cycle.
                let ramp = transition.max(1e-6);
                if t < 0.5 {
                    (t / ramp).clamp(0.0, 1.0)
                } else {
                    (1.0 - (t - 0.5) / ramp).clamp(0.0, 1.0)
                }
            })
            .collect();
        Self { weights }
    }
}

/// Left/right clock table pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardClocks {
    pub left: ClockTable,
    pub right: ClockTable,
}

impl RewardClocks {
    /// Build the table pair a dotted tag names: `_smooth` selects the
    /// sinusoidal family, `_strictX` a near-binary table with transition
    /// width X. Plain stems default to smooth. Feet run half a cycle
    /// apart.
    pub fn from_tag(tag: &str, phaselen: usize) -> Self {
        if let Some(pos) = tag.find("_strict") {
            let width: f64 = tag[pos + "_strict".len()..]
                .trim_end_matches("_aerial")
                .parse()
                .unwrap_or(0.1);
            Self {
                left: ClockTable::strict(phaselen, 0.0, width),
                right: ClockTable::strict(phaselen, 0.5, width),
            }
        } else {
            Self {
                left: ClockTable::smooth(phaselen, 0.0),
                right: ClockTable::smooth(phaselen, 0.5),
            }
        }
    }
}

/// Everything a reward variant may consume for one control step.
#[derive(Debug, Clone, Copy)]
pub struct RewardInputs<'a> {
    pub qpos: &'a [f64],
    pub qvel: &'a [f64],
    pub ref_pos: &'a [f64],
    pub ref_vel: &'a [f64],
    pub phase: usize,
    pub speed: f64,
    pub left: &'a ContactAverages,
    pub right: &'a ContactAverages,
    /// Segment global-state summary at the current phase, when the
    /// trajectory carries one.
    pub segment_summary: Option<[f64; SUMMARY_WIDTH]>,
}

/// Reward dispatcher: variant plus its clock tables, resolved once.
#[derive(Debug, Clone)]
pub struct RewardStrategy {
    variant: RewardVariant,
    clocks: Option<RewardClocks>,
    early_term_cutoff: f64,
}

impl RewardStrategy {
    /// Resolve `tag` and bind clock tables. Clock-family tags without
    /// supplied tables fall back to the family the tag names; anything
    /// else with tables attached simply ignores them.
    pub fn from_tag(
        tag: &str,
        clocks: Option<RewardClocks>,
        phaselen: usize,
    ) -> Result<Self, ConfigError> {
        let variant = RewardVariant::parse(tag)?;
        let clocks = if variant.is_clock_family() {
            let clocks = clocks.unwrap_or_else(|| RewardClocks::from_tag(tag, phaselen));
            // Tables must cover every phase the clock can reach.
            ClockTable::new(clocks.left.weights.clone(), phaselen)?;
            ClockTable::new(clocks.right.weights.clone(), phaselen)?;
            Some(clocks)
        } else {
            None
        };
        Ok(Self {
            variant,
            clocks,
            early_term_cutoff: variant.early_term_cutoff(),
        })
    }

    pub fn variant(&self) -> RewardVariant {
        self.variant
    }

    /// Cutoff the episode controller compares against the latest score.
    pub fn early_term_cutoff(&self) -> f64 {
        self.early_term_cutoff
    }

    /// Score one control step. Also refreshes the published cutoff.
    pub fn compute(&mut self, inputs: &RewardInputs<'_>) -> f64 {
        self.early_term_cutoff = self.variant.early_term_cutoff();
        match self.variant {
            RewardVariant::Clock => self.clock_reward(inputs),
            RewardVariant::AslipClock => self.aslip_clock_reward(inputs),
            RewardVariant::MaxVelClock => self.max_vel_clock_reward(inputs),
            RewardVariant::AslipOld => self.aslip_old_reward(inputs),
            RewardVariant::IrosPaper => self.iros_paper_reward(inputs),
            RewardVariant::Speed => self.speed_reward(inputs),
        }
    }

    // ----- Shared error terms -----

    fn orientation_error(qpos: &[f64]) -> f64 {
        // Deviation of the pelvis quaternion from level heading; the
        // inner product with (1,0,0,0) is just the scalar part. The
        // alignment is capped at 1 so an unnormalized state cannot turn
        // the penalty into a bonus.
        5.0 * (1.0 - (qpos[3] * qpos[3]).min(1.0))
    }

    fn joint_error(qpos: &[f64], ref_pos: &[f64]) -> f64 {
        const WEIGHT: [f64; 10] = [0.15, 0.15, 0.1, 0.05, 0.05, 0.15, 0.15, 0.1, 0.05, 0.05];
        let mut err = 0.0;
        for (i, &idx) in MOTOR_POS_IDX.iter().enumerate() {
            let d = ref_pos[idx] - qpos[idx];
            err += 30.0 * WEIGHT[i] * d * d;
        }
        err
    }

    fn spring_error(qpos: &[f64], ref_pos: &[f64]) -> f64 {
        let mut err = 0.0;
        for &idx in SPRING_POS_IDX.iter() {
            let d = ref_pos[idx] - qpos[idx];
            err += 1000.0 * d * d;
        }
        err
    }

    fn forward_diff(qvel: &[f64], speed: f64) -> f64 {
        let d = (qvel[0] - speed).abs();
        if d < 0.05 {
            0.0
        } else {
            d
        }
    }

    fn lateral_vel(qvel: &[f64]) -> f64 {
        let d = qvel[1].abs();
        if d < 0.03 {
            0.0
        } else {
            d
        }
    }

    fn straight_diff(qpos: &[f64]) -> f64 {
        let d = qpos[1].abs();
        if d < 0.05 {
            0.0
        } else {
            d
        }
    }

    fn com_pos_error(qpos: &[f64], ref_pos: &[f64]) -> f64 {
        let mut err = 0.0;
        for i in 0..3 {
            let d = qpos[i] - ref_pos[i];
            err += d * d;
        }
        err
    }

    fn com_vel_error(qvel: &[f64], ref_vel: &[f64]) -> f64 {
        let mut err = 0.0;
        for i in 0..3 {
            let d = qvel[i] - ref_vel[i];
            err += d * d;
        }
        err
    }

    /// Stance/swing match terms for one foot: how well the averaged
    /// force and foot speed agree with the commanded weight.
    fn clock_terms(weight: f64, foot: &ContactAverages) -> (f64, f64) {
        let frc_sat = 1.0 - (-foot.force / 100.0).exp();
        let frc_score = weight * frc_sat + (1.0 - weight) * (1.0 - frc_sat);

        let speed = (foot.velocity[0] * foot.velocity[0]
            + foot.velocity[1] * foot.velocity[1]
            + foot.velocity[2] * foot.velocity[2])
            .sqrt();
        let spd_sat = 1.0 - (-2.0 * speed).exp();
        let vel_score = weight * (1.0 - spd_sat) + (1.0 - weight) * spd_sat;

        (frc_score, vel_score)
    }

    fn clock_scores(&self, inputs: &RewardInputs<'_>) -> (f64, f64) {
        let clocks = self
            .clocks
            .as_ref()
            .unwrap_or_else(|| unreachable!("clock variants are constructed with tables"));
        let (l_frc, l_vel) =
            Self::clock_terms(clocks.left.stance_weight(inputs.phase), inputs.left);
        let (r_frc, r_vel) =
            Self::clock_terms(clocks.right.stance_weight(inputs.phase), inputs.right);
        (l_frc + r_frc, l_vel + r_vel)
    }

    fn foot_orient_cost(inputs: &RewardInputs<'_>) -> f64 {
        10.0 * (inputs.left.orient_cost + inputs.right.orient_cost)
    }

    // ----- Variants -----

    fn clock_reward(&self, inputs: &RewardInputs<'_>) -> f64 {
        let (frc, vel) = self.clock_scores(inputs);
        0.225 * frc
            + 0.075 * vel
            + 0.150 * (-Self::forward_diff(inputs.qvel, inputs.speed)).exp()
            + 0.100 * (-Self::lateral_vel(inputs.qvel)).exp()
            + 0.100 * (-Self::orientation_error(inputs.qpos)).exp()
            + 0.050 * (-Self::foot_orient_cost(inputs)).exp()
    }

    fn max_vel_clock_reward(&self, inputs: &RewardInputs<'_>) -> f64 {
        let (frc, vel) = self.clock_scores(inputs);
        let forward = inputs.qvel[0].max(0.0);
        0.225 * frc
            + 0.075 * vel
            + 0.250 * (1.0 - (-forward).exp())
            + 0.100 * (-Self::lateral_vel(inputs.qvel)).exp()
            + 0.050 * (-Self::orientation_error(inputs.qpos)).exp()
    }

    fn aslip_clock_reward(&self, inputs: &RewardInputs<'_>) -> f64 {
        let (frc, vel) = self.clock_scores(inputs);
        0.225 * frc
            + 0.075 * vel
            + 0.150 * (-Self::com_pos_error(inputs.qpos, inputs.ref_pos)).exp()
            + 0.100 * (-Self::com_vel_error(inputs.qvel, inputs.ref_vel)).exp()
            + 0.150 * (-Self::orientation_error(inputs.qpos)).exp()
    }

    fn aslip_old_reward(&self, inputs: &RewardInputs<'_>) -> f64 {
        // Foot placement error against the segment summary, in the
        // pelvis frame.
        let summary = inputs.segment_summary.unwrap_or([0.0; SUMMARY_WIDTH]);
        let mut foot_err = [0.0; 2];
        for (foot_idx, (foot, base)) in [(inputs.left, 0usize), (inputs.right, 6usize)]
            .into_iter()
            .enumerate()
        {
            let mut err = 0.0;
            for i in 0..3 {
                let rel = foot.position[i] - inputs.qpos[i];
                let d = rel - summary[base + i];
                err += d * d;
            }
            foot_err[foot_idx] = err;
        }

        0.300 * (-Self::com_pos_error(inputs.qpos, inputs.ref_pos)).exp()
            + 0.200 * (-Self::com_vel_error(inputs.qvel, inputs.ref_vel)).exp()
            + 0.200 * (-10.0 * foot_err[0]).exp()
            + 0.200 * (-10.0 * foot_err[1]).exp()
            + 0.100 * (-Self::orientation_error(inputs.qpos)).exp()
    }

    fn iros_paper_reward(&self, inputs: &RewardInputs<'_>) -> f64 {
        0.300 * (-Self::orientation_error(inputs.qpos)).exp()
            + 0.200 * (-Self::joint_error(inputs.qpos, inputs.ref_pos)).exp()
            + 0.200 * (-Self::spring_error(inputs.qpos, inputs.ref_pos)).exp()
            + 0.150 * (-Self::forward_diff(inputs.qvel, inputs.speed)).exp()
            + 0.150 * (-Self::lateral_vel(inputs.qvel)).exp()
    }

    fn speed_reward(&self, inputs: &RewardInputs<'_>) -> f64 {
        0.350 * (-Self::forward_diff(inputs.qvel, inputs.speed)).exp()
            + 0.250 * (-Self::orientation_error(inputs.qpos)).exp()
            + 0.200 * (-Self::lateral_vel(inputs.qvel)).exp()
            + 0.200 * (-Self::straight_diff(inputs.qpos)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QPOS_LEN, QVEL_LEN};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn nominal_inputs<'a>(
        qpos: &'a [f64],
        qvel: &'a [f64],
        left: &'a ContactAverages,
        right: &'a ContactAverages,
    ) -> RewardInputs<'a> {
        RewardInputs {
            qpos,
            qvel,
            ref_pos: qpos,
            ref_vel: qvel,
            phase: 3,
            speed: 1.0,
            left,
            right,
            segment_summary: Some([0.0; SUMMARY_WIDTH]),
        }
    }

    #[test]
    fn test_parse_tag_families() {
        assert_eq!(RewardVariant::parse("clock").unwrap(), RewardVariant::Clock);
        assert_eq!(
            RewardVariant::parse("clock_strict0.4_aerial").unwrap(),
            RewardVariant::Clock
        );
        assert_eq!(
            RewardVariant::parse("aslip_clock_smooth").unwrap(),
            RewardVariant::AslipClock
        );
        assert_eq!(
            RewardVariant::parse("max_vel_clock_smooth").unwrap(),
            RewardVariant::MaxVelClock
        );
        assert_eq!(
            RewardVariant::parse("5k_speed_reward").unwrap(),
            RewardVariant::Speed
        );
        assert!(RewardVariant::parse("bouncy").is_err());
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        let err = RewardStrategy::from_tag("no_such_reward", None, 30);
        assert!(matches!(err, Err(ConfigError::UnknownRewardTag(_))));
    }

    #[test]
    fn test_short_clock_table_rejected() {
        let clocks = RewardClocks {
            left: ClockTable::smooth(5, 0.0),
            right: ClockTable::smooth(5, 0.5),
        };
        let err = RewardStrategy::from_tag("clock", Some(clocks), 30);
        assert!(matches!(err, Err(ConfigError::ClockTableTooShort { .. })));
    }

    #[test]
    fn test_cutoffs_per_variant() {
        let phaselen = 30;
        let cutoff = |tag: &str| {
            RewardStrategy::from_tag(tag, None, phaselen)
                .unwrap()
                .early_term_cutoff()
        };
        assert_eq!(cutoff("clock"), 0.2);
        assert_eq!(cutoff("aslip_old"), 0.0);
        assert_eq!(cutoff("iros_paper"), 0.3);
    }

    #[test]
    fn test_perfect_tracking_scores_high() {
        let mut qpos = vec![0.0; QPOS_LEN];
        qpos[2] = 1.01;
        qpos[3] = 1.0;
        let mut qvel = vec![0.0; QVEL_LEN];
        qvel[0] = 1.0;
        let still = ContactAverages {
            force: 400.0,
            ..ContactAverages::default()
        };

        let mut strategy = RewardStrategy::from_tag("iros_paper", None, 30).unwrap();
        let r = strategy.compute(&nominal_inputs(&qpos, &qvel, &still, &still));
        assert!(r > 0.95, "perfect tracking should score near 1, got {r}");
    }

    #[test]
    fn test_all_variants_bounded_over_random_states() {
        let tags = [
            "clock",
            "aslip_clock",
            "max_vel_clock",
            "aslip_old",
            "iros_paper",
            "speed",
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(2024);

        for tag in tags {
            let mut strategy = RewardStrategy::from_tag(tag, None, 30).unwrap();
            for _ in 0..200 {
                let qpos: Vec<f64> = (0..QPOS_LEN).map(|_| rng.gen_range(-2.0..2.0)).collect();
                let qvel: Vec<f64> = (0..QVEL_LEN).map(|_| rng.gen_range(-3.0..3.0)).collect();
                let ref_pos: Vec<f64> =
                    (0..QPOS_LEN).map(|_| rng.gen_range(-2.0..2.0)).collect();
                let ref_vel: Vec<f64> =
                    (0..QVEL_LEN).map(|_| rng.gen_range(-3.0..3.0)).collect();
                let foot = |rng: &mut ChaCha8Rng| ContactAverages {
                    force: rng.gen_range(0.0..900.0),
                    position: [rng.gen_range(-1.0..1.0); 3],
                    velocity: [rng.gen_range(-3.0..3.0); 3],
                    orient_cost: rng.gen_range(0.0..1.0),
                };
                let left = foot(&mut rng);
                let right = foot(&mut rng);

                let inputs = RewardInputs {
                    qpos: &qpos,
                    qvel: &qvel,
                    ref_pos: &ref_pos,
                    ref_vel: &ref_vel,
                    phase: rng.gen_range(0..=30),
                    speed: rng.gen_range(0.0..2.0),
                    left: &left,
                    right: &right,
                    segment_summary: Some([0.0; SUMMARY_WIDTH]),
                };

                let r = strategy.compute(&inputs);
                assert!(r.is_finite(), "{tag} produced a non-finite reward");
                assert!(
                    (0.0..=1.0).contains(&r),
                    "{tag} left its documented range: {r}"
                );
            }
        }
    }

    #[test]
    fn test_clock_prefers_matching_contact() {
        let mut strategy = RewardStrategy::from_tag("clock", None, 30).unwrap();
        let qpos = {
            let mut q = vec![0.0; QPOS_LEN];
            q[3] = 1.0;
            q
        };
        let mut qvel = vec![0.0; QVEL_LEN];
        qvel[0] = 1.0;

        let loaded = ContactAverages {
            force: 400.0,
            ..ContactAverages::default()
        };
        let airborne = ContactAverages::default();

        // Phase 0: left commanded stance, right commanded swing.
        let matched = RewardInputs {
            qpos: &qpos,
            qvel: &qvel,
            ref_pos: &qpos,
            ref_vel: &qvel,
            phase: 0,
            speed: 1.0,
            left: &loaded,
            right: &airborne,
            segment_summary: None,
        };
        let swapped = RewardInputs {
            left: &airborne,
            right: &loaded,
            ..matched
        };

        let r_matched = strategy.compute(&matched);
        let r_swapped = strategy.compute(&swapped);
        assert!(
            r_matched > r_swapped,
            "force on the commanded-stance foot must score higher"
        );
    }
}
