// stridesim_env/src/lib.rs
//
// Python bindings for the stridesim gait environment.
//
// Provides a Gym-style API for training RL agents:
// - Env: single environment with reset(seed) and step(action)
// - VecEnv: vectorised environments for parallel rollouts
//
// All operations are deterministic given seeds. The bindings run over
// the in-tree kinematic backend; a physics-engine-backed build swaps the
// backend without touching this API.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use stridesim::sim::KinematicSim;
use stridesim::trajectory::{synthetic_segment_family, synthetic_walking};
use stridesim::{
    EnvConfig, GaitEnv as RustGaitEnv, StepInfo, TrajStyle, TrajectorySource,
    VecEnv as RustVecEnv,
};

fn build_env(
    traj: &str,
    reward: &str,
    history: usize,
    dynamics_randomization: bool,
    fixed_speed: Option<f64>,
) -> PyResult<RustGaitEnv<KinematicSim>> {
    let style = TrajStyle::parse(traj).map_err(|e| PyValueError::new_err(e.to_string()))?;

    let cfg = EnvConfig {
        traj: style,
        clock_based: style != TrajStyle::Segment,
        dynamics_randomization,
        reward: reward.to_string(),
        history,
        fixed_speed,
        ..EnvConfig::default()
    };

    let source = match style {
        TrajStyle::Segment => TrajectorySource::Family(synthetic_segment_family(28)),
        _ => TrajectorySource::Single(synthetic_walking(1700, cfg.simrate)),
    };

    RustGaitEnv::new(cfg, KinematicSim::new(), source, None)
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Convert step metadata to a Python dictionary.
fn info_to_dict(py: Python<'_>, info: &StepInfo) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);

    dict.set_item("step", info.step)?;
    dict.set_item("phase", info.phase)?;
    dict.set_item("counter", info.counter)?;
    dict.set_item("speed", info.speed)?;
    dict.set_item("stride_count", info.stride_count)?;
    dict.set_item(
        "termination_reason",
        info.termination_reason.map(|r| r.as_str()),
    )?;

    Ok(dict.into())
}

/// Gym-style environment wrapper.
///
/// Provides the standard RL interface:
/// - reset(seed) -> observation
/// - step(action) -> (observation, reward, done, info)
#[pyclass]
pub struct Env {
    inner: RustGaitEnv<KinematicSim>,
}

#[pymethods]
impl Env {
    /// Create a new environment.
    ///
    /// Args:
    ///     traj: "walking", "stepping" or "segment" (default: "walking")
    ///     reward: reward variant tag (default: "iros_paper")
    ///     history: number of past frames stacked (default: 0)
    ///     dynamics_randomization: sample dynamics each reset (default: True)
    ///     fixed_speed: pin the commanded speed (default: None)
    #[new]
    #[pyo3(signature = (traj="walking", reward="iros_paper", history=0, dynamics_randomization=true, fixed_speed=None))]
    fn new(
        traj: &str,
        reward: &str,
        history: usize,
        dynamics_randomization: bool,
        fixed_speed: Option<f64>,
    ) -> PyResult<Self> {
        Ok(Self {
            inner: build_env(traj, reward, history, dynamics_randomization, fixed_speed)?,
        })
    }

    /// Reset the environment.
    ///
    /// Args:
    ///     seed: optional seed for a deterministic episode
    ///
    /// Returns:
    ///     observation: list of floats
    #[pyo3(signature = (seed=None))]
    fn reset(&mut self, seed: Option<u64>) -> Vec<f64> {
        self.inner.reset(seed)
    }

    /// Deterministic evaluation reset: phase 0, speed 0, nominal
    /// dynamics.
    fn reset_for_test(&mut self) -> Vec<f64> {
        self.inner.reset_for_test()
    }

    /// Take a step.
    ///
    /// Args:
    ///     action: list of floats of width action_dim
    ///
    /// Returns:
    ///     Tuple of (observation, reward, done, info)
    fn step<'py>(
        &mut self,
        py: Python<'py>,
        action: Vec<f64>,
    ) -> PyResult<(Vec<f64>, f64, bool, Py<PyDict>)> {
        if action.len() != self.inner.action_width() {
            return Err(PyValueError::new_err(format!(
                "action length {} must match action_dim {}",
                action.len(),
                self.inner.action_width()
            )));
        }

        let result = self.inner.step(&action);
        let info = info_to_dict(py, &result.info)?;
        Ok((result.observation, result.reward, result.done, info))
    }

    /// Retarget the commanded speed mid-episode (evaluation helper).
    fn update_speed(&mut self, speed: f64) {
        self.inner.update_speed(speed);
    }

    /// Observation width.
    #[getter]
    fn obs_dim(&self) -> usize {
        self.inner.obs_size()
    }

    /// Action width (10, or 30 with gain learning).
    #[getter]
    fn action_dim(&self) -> usize {
        self.inner.action_width()
    }

    /// Current seed.
    #[getter]
    fn seed(&self) -> u64 {
        self.inner.seed()
    }

    /// Whether the episode is done.
    #[getter]
    fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Current phase and cycle length.
    #[getter]
    fn phase(&self) -> (usize, usize) {
        (self.inner.phase(), self.inner.phaselen())
    }

    /// Commanded speed.
    #[getter]
    fn speed(&self) -> f64 {
        self.inner.speed()
    }

    /// Observation mirror map as (source_index, sign) pairs, one per
    /// frame index; tile across stacked frames for history > 0.
    fn mirror_obs(&self) -> Vec<(usize, f64)> {
        self.inner
            .mirror_map()
            .obs_entries()
            .iter()
            .map(|e| (e.src, e.sign))
            .collect()
    }

    /// Action mirror map as (source_index, sign) pairs.
    fn mirror_acts(&self) -> Vec<(usize, f64)> {
        self.inner
            .mirror_map()
            .act_entries()
            .iter()
            .map(|e| (e.src, e.sign))
            .collect()
    }
}

/// Vectorised environment managing N independent Env instances.
#[pyclass]
pub struct VecEnv {
    inner: RustVecEnv<KinematicSim>,
}

#[pymethods]
impl VecEnv {
    /// Create a new vectorised environment.
    ///
    /// Args:
    ///     n: number of parallel environments
    ///     (remaining args as for Env)
    #[new]
    #[pyo3(signature = (n, traj="walking", reward="iros_paper", history=0, dynamics_randomization=true, fixed_speed=None))]
    fn new(
        n: usize,
        traj: &str,
        reward: &str,
        history: usize,
        dynamics_randomization: bool,
        fixed_speed: Option<f64>,
    ) -> PyResult<Self> {
        if n == 0 {
            return Err(PyValueError::new_err("n must be > 0"));
        }
        let envs = (0..n)
            .map(|_| build_env(traj, reward, history, dynamics_randomization, fixed_speed))
            .collect::<PyResult<Vec<_>>>()?;
        Ok(Self {
            inner: RustVecEnv::new(envs),
        })
    }

    /// Reset all environments with optional per-environment seeds.
    #[pyo3(signature = (seeds=None))]
    fn reset_all(&mut self, seeds: Option<Vec<u64>>) -> Vec<Vec<f64>> {
        self.inner.reset_all(seeds.as_deref())
    }

    /// Step all environments.
    ///
    /// Returns:
    ///     Tuple of (observations, rewards, dones, infos)
    #[allow(clippy::type_complexity)]
    fn step<'py>(
        &mut self,
        py: Python<'py>,
        actions: Vec<Vec<f64>>,
    ) -> PyResult<(Vec<Vec<f64>>, Vec<f64>, Vec<bool>, Vec<Py<PyDict>>)> {
        if actions.len() != self.inner.num_envs() {
            return Err(PyValueError::new_err(format!(
                "actions length {} must match num_envs {}",
                actions.len(),
                self.inner.num_envs()
            )));
        }

        let results = self.inner.step(&actions);

        let mut observations = Vec::with_capacity(results.len());
        let mut rewards = Vec::with_capacity(results.len());
        let mut dones = Vec::with_capacity(results.len());
        let mut infos = Vec::with_capacity(results.len());
        for r in results {
            rewards.push(r.reward);
            dones.push(r.done);
            infos.push(info_to_dict(py, &r.info)?);
            observations.push(r.observation);
        }

        Ok((observations, rewards, dones, infos))
    }

    /// Step all environments with the zero (hold-the-offset) action.
    #[allow(clippy::type_complexity)]
    fn step_zeros(
        &mut self,
        py: Python<'_>,
    ) -> PyResult<(Vec<Vec<f64>>, Vec<f64>, Vec<bool>, Vec<Py<PyDict>>)> {
        let results = self.inner.step_zeros();

        let mut observations = Vec::with_capacity(results.len());
        let mut rewards = Vec::with_capacity(results.len());
        let mut dones = Vec::with_capacity(results.len());
        let mut infos = Vec::with_capacity(results.len());
        for r in results {
            rewards.push(r.reward);
            dones.push(r.done);
            infos.push(info_to_dict(py, &r.info)?);
            observations.push(r.observation);
        }

        Ok((observations, rewards, dones, infos))
    }

    /// Number of environments.
    #[getter]
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    /// Current seeds of all environments.
    fn seeds(&self) -> Vec<u64> {
        self.inner.seeds()
    }

    /// Which environments are done.
    fn dones(&self) -> Vec<bool> {
        self.inner.dones()
    }
}

/// Python module definition.
#[pymodule]
fn stridesim_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Env>()?;
    m.add_class::<VecEnv>()?;
    Ok(())
}
