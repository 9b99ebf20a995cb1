// src/env.rs
//
// Gym-style gait environment: the episode controller that owns the phase
// clock, drives the fixed-rate control loop over the physics backend and
// composes trajectory lookup, action mapping, contact tracking,
// observation assembly and reward dispatch into reset/step.
//
// One step() performs exactly `simrate` physics sub-steps before
// returning; there are no suspension points. One environment instance is
// single-threaded and share-nothing; parallel training runs one instance
// per worker (see VecEnv).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::action::ActionTargetMapper;
use crate::config::{EnvConfig, TrajStyle};
use crate::contact::ContactStateTracker;
use crate::observation::{
    DescriptorInputs, MirrorMap, ObservationAssembler, ObservationInputs, PhaseDescriptor,
};
use crate::randomize::{DynamicsRandSampler, RandomizationSample};
use crate::reward::{RewardClocks, RewardInputs, RewardStrategy};
use crate::sim::{Body, PhysicsSim};
use crate::trajectory::{ReferenceTrajectory, SegmentFamily, TrajectoryMode, SUMMARY_WIDTH};
use crate::types::{ConfigError, PdTargets, SensorState, TerminationReason};

/// Pelvis height band outside of which the episode ends.
const PELVIS_HEIGHT_MIN: f64 = 0.4;
const PELVIS_HEIGHT_MAX: f64 = 3.0;

/// Tarsus height below which the robot is considered collapsed.
const TARSUS_HEIGHT_MIN: f64 = 0.1;

/// Discrete commanded-speed grid sampled at reset (0.0 to 2.0 m/s).
const SPEED_STEPS: u32 = 20;

/// Phase clock: discrete progress through one gait cycle.
///
/// Owned exclusively by the environment; mutated only inside step/reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseClock {
    /// Step index within the cycle, `0..=phaselen`.
    pub phase: usize,
    /// Cycle length in control steps.
    pub phaselen: usize,
    /// Phase increment per control step.
    pub phase_add: usize,
    /// Completed full cycles this episode.
    pub counter: u32,
    /// Commanded forward speed.
    pub speed: f64,
}

impl PhaseClock {
    /// Advance by `phase_add`; returns true when the cycle wrapped.
    /// Segment-indexed cycles wrap at `phaselen`, time-indexed just past
    /// it.
    fn advance(&mut self, segment_indexed: bool) -> bool {
        self.phase += self.phase_add;
        let wrapped = if segment_indexed {
            self.phase >= self.phaselen
        } else {
            self.phase > self.phaselen
        };
        if wrapped {
            self.phase = 0;
            self.counter += 1;
        }
        wrapped
    }
}

/// Reference data driving the episode: one fixed cycle, or a family
/// keyed by commanded speed.
pub enum TrajectorySource {
    Single(ReferenceTrajectory),
    Family(SegmentFamily),
}

/// Per-episode mutable state, grouped so reset can replace it wholesale.
#[derive(Debug, Clone)]
struct EpisodeState {
    clock: PhaseClock,
    /// Pelvis position snapshotted at the last cycle wrap; tracking
    /// baseline for global-frame references.
    last_pelvis_pos: [f64; 3],
    /// Commanded yaw offset removed from observations.
    orient_add: f64,
    randomization: Option<RandomizationSample>,
    steps: u64,
    done: bool,
    last_reason: Option<TerminationReason>,
}

/// Result of one control step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Vec<f64>,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Step metadata for telemetry and debugging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    /// Control steps taken this episode.
    pub step: u64,
    /// Phase after this step.
    pub phase: usize,
    /// Completed cycles after this step.
    pub counter: u32,
    /// Commanded speed.
    pub speed: f64,
    /// Completed high-arc strides.
    pub stride_count: u32,
    /// Set when this step terminated the episode.
    pub termination_reason: Option<TerminationReason>,
    /// Dynamics parameters active this episode.
    pub randomization: Option<RandomizationSample>,
}

/// Gym-style gait environment over a physics backend.
pub struct GaitEnv<S: PhysicsSim> {
    cfg: EnvConfig,
    sim: S,
    source: TrajectorySource,
    /// Active index into the segment family (0 for single trajectories).
    traj_idx: usize,
    mapper: ActionTargetMapper,
    assembler: ObservationAssembler,
    reward: RewardStrategy,
    contact: ContactStateTracker,
    sampler: Option<DynamicsRandSampler>,
    episode: EpisodeState,
    rng: ChaCha8Rng,
    seed: u64,
    last_sensor: SensorState,
    last_obs: Vec<f64>,
}

impl<S: PhysicsSim> GaitEnv<S> {
    /// Build an environment. All tag resolution and width validation
    /// happens here; steps never re-branch on configuration strings.
    pub fn new(
        cfg: EnvConfig,
        sim: S,
        source: TrajectorySource,
        clocks: Option<RewardClocks>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;

        match (&cfg.traj, &source) {
            (TrajStyle::Segment, TrajectorySource::Family(_)) => {}
            (TrajStyle::Walking | TrajStyle::Stepping, TrajectorySource::Single(t)) => {
                if !matches!(t.mode(), TrajectoryMode::TimeIndexed { .. }) {
                    return Err(ConfigError::TrajectorySourceMismatch);
                }
            }
            _ => return Err(ConfigError::TrajectorySourceMismatch),
        }

        let descriptor = if cfg.clock_based {
            PhaseDescriptor::Clock
        } else if cfg.traj == TrajStyle::Segment {
            PhaseDescriptor::SegmentSummary
        } else {
            PhaseDescriptor::ReferenceSlice
        };

        if descriptor == PhaseDescriptor::SegmentSummary {
            let has = match &source {
                TrajectorySource::Family(f) => {
                    (0..f.num_speeds()).all(|i| f.trajectory(i).has_summaries())
                }
                TrajectorySource::Single(t) => t.has_summaries(),
            };
            if !has {
                return Err(ConfigError::MissingSegmentSummaries);
            }
        }

        let phaselen = match &source {
            TrajectorySource::Single(t) => t.phaselen(),
            TrajectorySource::Family(f) => f.trajectory(0).phaselen(),
        };

        let reward = RewardStrategy::from_tag(&cfg.reward, clocks, phaselen)?;
        let assembler = ObservationAssembler::new(cfg.state_est, descriptor, cfg.history);
        let mapper = ActionTargetMapper::new(cfg.no_delta, cfg.learn_gains);
        let contact = ContactStateTracker::new(cfg.simrate);
        let sampler = if cfg.dynamics_randomization {
            Some(DynamicsRandSampler::new(cfg.rand.clone(), 0))
        } else {
            None
        };

        let speed = cfg.fixed_speed.unwrap_or(0.0);
        let obs_size = assembler.obs_size();

        Ok(Self {
            cfg,
            sim,
            source,
            traj_idx: 0,
            mapper,
            assembler,
            reward,
            contact,
            sampler,
            episode: EpisodeState {
                clock: PhaseClock {
                    phase: 0,
                    phaselen,
                    phase_add: 1,
                    counter: 0,
                    speed,
                },
                last_pelvis_pos: [0.0; 3],
                orient_add: 0.0,
                randomization: None,
                steps: 0,
                done: false,
                last_reason: None,
            },
            rng: ChaCha8Rng::seed_from_u64(0),
            seed: 0,
            last_sensor: SensorState::default(),
            last_obs: vec![0.0; obs_size],
        })
    }

    // ----- Accessors -----

    pub fn config(&self) -> &EnvConfig {
        &self.cfg
    }

    pub fn obs_size(&self) -> usize {
        self.assembler.obs_size()
    }

    pub fn action_width(&self) -> usize {
        self.mapper.action_width()
    }

    pub fn phase(&self) -> usize {
        self.episode.clock.phase
    }

    pub fn phaselen(&self) -> usize {
        self.episode.clock.phaselen
    }

    pub fn counter(&self) -> u32 {
        self.episode.clock.counter
    }

    pub fn speed(&self) -> f64 {
        self.episode.clock.speed
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_done(&self) -> bool {
        self.episode.done
    }

    /// Pelvis position snapshotted at the start of the current cycle;
    /// the baseline global-frame references are tracked against.
    pub fn cycle_origin(&self) -> [f64; 3] {
        self.episode.last_pelvis_pos
    }

    /// Mirror map for this environment's observation/action layout.
    pub fn mirror_map(&self) -> MirrorMap {
        self.assembler.mirror_map(self.cfg.learn_gains)
    }

    /// Backend access for scripted test scenarios.
    pub fn sim_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    fn current_trajectory(&self) -> &ReferenceTrajectory {
        match &self.source {
            TrajectorySource::Single(t) => t,
            TrajectorySource::Family(f) => f.trajectory(self.traj_idx),
        }
    }

    fn segment_indexed(&self) -> bool {
        self.cfg.traj == TrajStyle::Segment
    }

    // ----- Reset -----

    /// Full-randomization reset. Samples a commanded speed and a uniform
    /// starting phase, re-seeds the backend from the reference pose and
    /// draws fresh dynamics parameters when enabled. Returns the initial
    /// observation.
    pub fn reset(&mut self, seed: Option<u64>) -> Vec<f64> {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);

        // Commanded speed, then trajectory selection for the family.
        let speed = match &self.source {
            TrajectorySource::Family(family) => {
                self.traj_idx = self.rng.gen_range(0..family.num_speeds());
                if let Some(fixed) = self.cfg.fixed_speed {
                    self.traj_idx = family.nearest_index(fixed);
                    fixed
                } else {
                    family.speed(self.traj_idx)
                }
            }
            TrajectorySource::Single(_) => {
                let sampled = self.rng.gen_range(0..=SPEED_STEPS) as f64 / 10.0;
                self.cfg.fixed_speed.unwrap_or(sampled)
            }
        };

        let phaselen = self.current_trajectory().phaselen();
        let phase = self.rng.gen_range(0..=phaselen);
        self.episode.clock = PhaseClock {
            phase,
            phaselen,
            phase_add: 1,
            counter: 0,
            speed,
        };

        // Fresh dynamics parameters, pushed to the backend in one staged
        // commit.
        self.episode.randomization = if let Some(sampler) = self.sampler.as_mut() {
            sampler.reseed(seed);
            let sample = sampler.sample_episode(self.cfg.learn_gains);
            self.sim.set_ground_friction(sample.friction);
            self.sim
                .set_ground_orientation(slope_quat(sample.slope));
            self.sim.commit_parameter_changes();
            Some(sample)
        } else {
            None
        };

        self.seed_pose_from_reference(phase, speed);
        self.finish_reset()
    }

    /// Deterministic reset used by evaluation: phase 0, speed 0, nominal
    /// dynamics, no sampling.
    pub fn reset_for_test(&mut self) -> Vec<f64> {
        if matches!(self.source, TrajectorySource::Family(_)) {
            self.traj_idx = 0;
        }
        let phaselen = self.current_trajectory().phaselen();
        self.episode.clock = PhaseClock {
            phase: 0,
            phaselen,
            phase_add: 1,
            counter: 0,
            speed: 0.0,
        };

        self.episode.randomization = None;
        self.sim.reset_to_default();
        let nominal = RandomizationSample::nominal();
        self.sim.set_ground_friction(nominal.friction);
        self.sim.set_ground_orientation([1.0, 0.0, 0.0, 0.0]);
        self.sim.commit_parameter_changes();

        self.seed_pose_from_reference(0, 0.0);
        self.finish_reset()
    }

    fn seed_pose_from_reference(&mut self, phase: usize, speed: f64) {
        let (qpos, mut qvel) = self.current_trajectory().lookup(phase, speed, 0);
        if self.segment_indexed() {
            // Segment references start each episode at rest.
            qvel.iter_mut().for_each(|v| *v = 0.0);
        }
        self.sim.set_qpos(&qpos);
        self.sim.set_qvel(&qvel);
    }

    fn finish_reset(&mut self) -> Vec<f64> {
        self.episode.orient_add = 0.0;
        self.episode.steps = 0;
        self.episode.done = false;
        self.episode.last_reason = None;
        self.episode.last_pelvis_pos = self.sim.body_position(Body::Pelvis);

        self.assembler.reset();
        self.contact.reset(self.sim.foot_positions());

        // Prime the sensor estimate with one passive PD step, as the
        // command interface does after repositioning.
        self.last_sensor = self.sim.step_pd(&PdTargets::default());

        let obs = self.build_observation();
        self.last_obs = obs.clone();
        obs
    }

    // ----- Step -----

    /// Advance one control step. Panics if the action width does not
    /// match the configuration (widths are fixed at construction).
    pub fn step(&mut self, action: &[f64]) -> StepResult {
        if self.episode.done {
            // Terminal absorbing state: repeat the last observation.
            return StepResult {
                observation: self.last_obs.clone(),
                reward: 0.0,
                done: true,
                info: self.build_info(self.episode.last_reason),
            };
        }

        assert_eq!(
            action.len(),
            self.mapper.action_width(),
            "action width must match the configured environment"
        );

        let targets = self.compute_targets(action);

        self.contact.begin_control_step();
        for _ in 0..self.cfg.simrate {
            self.last_sensor = self.sim.step_pd(&targets);
            self.contact.observe_substep(
                self.sim.foot_positions(),
                self.sim.foot_forces(),
                self.sim.body_quat(Body::LeftFoot),
                self.sim.body_quat(Body::RightFoot),
            );
        }

        self.episode.steps += 1;
        let segment_indexed = self.segment_indexed();
        if self.episode.clock.advance(segment_indexed) {
            // New cycle: the current pelvis position becomes the
            // tracking baseline.
            self.episode.last_pelvis_pos = self.sim.body_position(Body::Pelvis);
        }

        // Termination checks, in order. A non-finite pelvis height fails
        // the band check and ends the episode rather than crashing.
        let mut reason = None;
        let left_tarsus = self.sim.body_position(Body::LeftTarsus)[2];
        let right_tarsus = self.sim.body_position(Body::RightTarsus)[2];
        if left_tarsus < TARSUS_HEIGHT_MIN || right_tarsus < TARSUS_HEIGHT_MIN {
            reason = Some(TerminationReason::TarsusCollapse);
        } else {
            let height = self.sim.qpos()[2];
            if !(height >= PELVIS_HEIGHT_MIN && height <= PELVIS_HEIGHT_MAX) {
                reason = Some(TerminationReason::PelvisHeightOutOfBounds);
            }
        }

        let reward = self.compute_reward();
        if reason.is_none() && reward < self.reward.early_term_cutoff() {
            reason = Some(TerminationReason::RewardBelowCutoff);
        }

        self.episode.done = reason.is_some();
        self.episode.last_reason = reason;

        let observation = self.build_observation();
        self.last_obs = observation.clone();

        StepResult {
            observation,
            reward,
            done: self.episode.done,
            info: self.build_info(reason),
        }
    }

    /// Retarget the commanded speed mid-episode (evaluation helper).
    /// Switching trajectories within the family rescales the phase so
    /// cycle progress is preserved.
    pub fn update_speed(&mut self, new_speed: f64) {
        match &self.source {
            TrajectorySource::Family(family) => {
                self.traj_idx = family.nearest_index(new_speed);
                let old_phaselen = self.episode.clock.phaselen;
                let new_phaselen = family.trajectory(self.traj_idx).phaselen();
                self.episode.clock.phase =
                    new_phaselen * self.episode.clock.phase / old_phaselen.max(1);
                self.episode.clock.phaselen = new_phaselen;
                self.episode.clock.speed = family.speed(self.traj_idx);
            }
            TrajectorySource::Single(_) => {
                self.episode.clock.speed = new_speed;
            }
        }
    }

    // ----- Internals -----

    fn compute_targets(&self, action: &[f64]) -> PdTargets {
        let clock = self.episode.clock;
        // Targets lead the clock by one increment; the segment family
        // wraps its final phase to the cycle start.
        let target_phase = if self.segment_indexed() && clock.phase == clock.phaselen - 1 {
            0
        } else {
            clock.phase + clock.phase_add
        };
        let reference_pose = self.current_trajectory().motor_pose(target_phase);

        let sample = self.episode.randomization.as_ref();
        let joint_offsets = sample.map(|s| &s.joint_offsets);
        let gain_deltas = sample.and_then(|s| s.gain_deltas.as_ref());

        self.mapper
            .compute_targets(action, &reference_pose, joint_offsets, gain_deltas)
    }

    fn compute_reward(&mut self) -> f64 {
        let clock = self.episode.clock;
        let (ref_pos, ref_vel) =
            self.current_trajectory()
                .lookup(clock.phase, clock.speed, clock.counter);
        let (left, right) = self.contact.finish_control_step();
        let segment_summary = self.current_trajectory().segment_summary(clock.phase);

        let inputs = RewardInputs {
            qpos: self.sim.qpos(),
            qvel: self.sim.qvel(),
            ref_pos: &ref_pos,
            ref_vel: &ref_vel,
            phase: clock.phase,
            speed: clock.speed,
            left: &left,
            right: &right,
            segment_summary,
        };
        self.reward.compute(&inputs)
    }

    fn build_observation(&mut self) -> Vec<f64> {
        let clock = self.episode.clock;
        let joint_offsets = self.episode.randomization.as_ref().map(|s| &s.joint_offsets);

        // The reference slice leads the clock by one increment (lookup
        // clamps past-the-end phases back to the cycle start).
        let (ref_pos, ref_vel) = self.current_trajectory().lookup(
            clock.phase + clock.phase_add,
            clock.speed,
            clock.counter,
        );

        let summary_phase = if clock.phase == 0 {
            clock.phaselen.saturating_sub(1)
        } else {
            clock.phase
        };
        let summary = self
            .current_trajectory()
            .segment_summary(summary_phase)
            .unwrap_or([0.0; SUMMARY_WIDTH]);

        let descriptor = match self.assembler.clock_inds() {
            Some(_) => DescriptorInputs::Clock {
                phase: clock.phase,
                phaselen: clock.phaselen,
                speed: clock.speed,
            },
            None => {
                if self.segment_indexed() {
                    DescriptorInputs::SegmentSummary { summary: &summary }
                } else {
                    DescriptorInputs::ReferenceSlice {
                        ref_pos: &ref_pos,
                        ref_vel: &ref_vel,
                    }
                }
            }
        };

        let inputs = ObservationInputs {
            sensor: &self.last_sensor,
            qpos: self.sim.qpos(),
            qvel: self.sim.qvel(),
            orient_add: self.episode.orient_add,
            joint_offsets,
            descriptor,
        };
        self.assembler.assemble(&inputs)
    }

    fn build_info(&self, reason: Option<TerminationReason>) -> StepInfo {
        StepInfo {
            step: self.episode.steps,
            phase: self.episode.clock.phase,
            counter: self.episode.clock.counter,
            speed: self.episode.clock.speed,
            stride_count: self.contact.step_count(),
            termination_reason: reason,
            randomization: self.episode.randomization.clone(),
        }
    }
}

/// Ground-plane quaternion for two slope angles (pitch, roll).
fn slope_quat(slope: [f64; 2]) -> [f64; 4] {
    let q = glam::DQuat::from_euler(glam::EulerRot::ZYX, 0.0, slope[0], slope[1]);
    [q.w, q.x, q.y, q.z]
}

/// Vectorised environment: N independent share-nothing instances.
pub struct VecEnv<S: PhysicsSim> {
    envs: Vec<GaitEnv<S>>,
}

impl<S: PhysicsSim> VecEnv<S> {
    pub fn new(envs: Vec<GaitEnv<S>>) -> Self {
        Self { envs }
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn envs(&self) -> &[GaitEnv<S>] {
        &self.envs
    }

    /// Reset every environment; missing seeds fall back to each
    /// environment's own RNG.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Vec<Vec<f64>> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| env.reset(seeds.and_then(|s| s.get(i).copied())))
            .collect()
    }

    /// Step every environment with its own action.
    pub fn step(&mut self, actions: &[Vec<f64>]) -> Vec<StepResult> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "actions length must match number of environments"
        );
        self.envs
            .iter_mut()
            .zip(actions.iter())
            .map(|(env, action)| env.step(action))
            .collect()
    }

    /// Step every environment with the zero (hold-the-offset) action.
    pub fn step_zeros(&mut self) -> Vec<StepResult> {
        let actions: Vec<Vec<f64>> = self
            .envs
            .iter()
            .map(|env| vec![0.0; env.action_width()])
            .collect();
        self.step(&actions)
    }

    pub fn seeds(&self) -> Vec<u64> {
        self.envs.iter().map(|e| e.seed()).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_done()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::sim::KinematicSim;
    use crate::trajectory::synthetic_walking;

    fn make_env(cfg: EnvConfig) -> GaitEnv<KinematicSim> {
        let traj = synthetic_walking(1700, cfg.simrate);
        GaitEnv::new(
            cfg,
            KinematicSim::new(),
            TrajectorySource::Single(traj),
            None,
        )
        .expect("valid config")
    }

    #[test]
    fn test_reset_returns_full_observation() {
        let mut env = make_env(EnvConfig::deterministic());
        let obs = env.reset(Some(42));
        assert_eq!(obs.len(), env.obs_size());
        assert!(!env.is_done());
    }

    #[test]
    fn test_step_advances_phase() {
        let mut env = make_env(EnvConfig::deterministic());
        env.reset(Some(42));
        let phase_before = env.phase();
        let result = env.step(&vec![0.0; env.action_width()]);
        assert_eq!(result.info.step, 1);
        assert_eq!(env.phase(), (phase_before + 1) % (env.phaselen() + 1));
    }

    #[test]
    fn test_phase_wraps_and_counts_cycles() {
        let mut env = make_env(EnvConfig::deterministic());
        env.reset(Some(7));
        // Walk exactly one full cycle from phase 0.
        let action = vec![0.0; env.action_width()];
        let start_phase = env.phase();
        let steps_to_wrap = env.phaselen() + 1 - start_phase;
        for _ in 0..steps_to_wrap {
            env.step(&action);
        }
        assert_eq!(env.phase(), 0);
        assert_eq!(env.counter(), 1);
    }

    #[test]
    fn test_unknown_reward_tag_fails_construction() {
        let cfg = EnvConfig {
            reward: "definitely_not_a_reward".to_string(),
            ..EnvConfig::deterministic()
        };
        let traj = synthetic_walking(1700, cfg.simrate);
        let err = GaitEnv::new(
            cfg,
            KinematicSim::new(),
            TrajectorySource::Single(traj),
            None,
        );
        assert!(matches!(err, Err(ConfigError::UnknownRewardTag(_))));
    }

    #[test]
    fn test_step_after_done_is_absorbing() {
        let mut env = make_env(EnvConfig::deterministic());
        env.reset(Some(11));
        let simrate = env.config().simrate;
        // Drive the pelvis below the height floor.
        env.sim_mut().push_script(vec![
            crate::sim::ScriptFrame {
                pelvis_z: Some(0.35),
                ..Default::default()
            };
            simrate
        ]);
        let action = vec![0.0; env.action_width()];
        let result = env.step(&action);
        assert!(result.done);

        let after = env.step(&action);
        assert!(after.done);
        assert_eq!(after.reward, 0.0);
        assert_eq!(after.observation, result.observation);
    }
}
