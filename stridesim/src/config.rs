// src/config.rs
//
// Central configuration for the gait environment.
// This is the single source of truth for the simulation-rate, state-space
// and curriculum switches that the original command interface exposed as
// constructor keywords.
//
// Reward and trajectory tags are carried here as strings and resolved to
// tagged variants exactly once, at environment construction. Unknown tags
// are construction errors, never runtime fallbacks.

use crate::randomize::DynamicsRandConfig;
use crate::types::{ConfigError, NUM_MOTORS};

/// Reference-trajectory style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajStyle {
    /// Time-indexed walking gait (one full left+right step pair).
    Walking,
    /// Time-indexed stepping gait with exaggerated foot clearance.
    Stepping,
    /// Segment-indexed trajectory family keyed by discrete commanded
    /// speed.
    Segment,
}

impl TrajStyle {
    /// Stable lowercase name (used in logs and the CLI).
    pub fn as_str(&self) -> &'static str {
        match self {
            TrajStyle::Walking => "walking",
            TrajStyle::Stepping => "stepping",
            TrajStyle::Segment => "segment",
        }
    }

    /// Parse a style name (case-insensitive). Unknown names are a
    /// configuration error.
    pub fn parse(s: &str) -> Result<TrajStyle, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "walking" => Ok(TrajStyle::Walking),
            "stepping" => Ok(TrajStyle::Stepping),
            "segment" | "aslip" => Ok(TrajStyle::Segment),
            other => Err(ConfigError::UnknownTrajectoryStyle(other.to_string())),
        }
    }
}

/// Environment configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Reference trajectory style.
    pub traj: TrajStyle,
    /// Physics sub-steps per control step. 50 brings a 2 kHz simulator
    /// down to a 40 Hz policy rate.
    pub simrate: usize,
    /// Use the sinusoidal clock pair + speed as the phase descriptor
    /// instead of a reference-trajectory slice. Forced off for the
    /// segment-indexed family.
    pub clock_based: bool,
    /// Build observations from the state estimator rather than raw
    /// generalized coordinates.
    pub state_est: bool,
    /// Offset policy: when true, actions are deltas around a fixed
    /// neutral pose; when false, around the current reference pose.
    pub no_delta: bool,
    /// Split a 30-wide action into pose targets plus PD gain deltas.
    pub learn_gains: bool,
    /// Sample fresh dynamics parameters (friction, slope, joint offsets)
    /// each reset.
    pub dynamics_randomization: bool,
    /// Ranges the per-episode sampler draws from.
    pub rand: DynamicsRandConfig,
    /// Reward variant tag, resolved at construction. Accepts both the
    /// short family names ("clock", "iros_paper", ...) and the dotted
    /// table-selecting names ("clock_smooth", "aslip_clock_strict0.1",
    /// ...).
    pub reward: String,
    /// Number of past observation frames appended to the current one.
    pub history: usize,
    /// Curriculum override: pin the commanded speed instead of sampling
    /// it at reset.
    pub fixed_speed: Option<f64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            version: "stridesim-0.4",
            traj: TrajStyle::Walking,
            simrate: 50,
            clock_based: true,
            state_est: true,
            no_delta: true,
            learn_gains: false,
            dynamics_randomization: true,
            rand: DynamicsRandConfig::default(),
            reward: "iros_paper".to_string(),
            history: 0,
            fixed_speed: None,
        }
    }
}

impl EnvConfig {
    /// Config with no randomization and a pinned speed, for deterministic
    /// tests.
    pub fn deterministic() -> Self {
        Self {
            dynamics_randomization: false,
            rand: DynamicsRandConfig::deterministic(),
            fixed_speed: Some(0.0),
            ..Self::default()
        }
    }

    /// Config for the segment-indexed trajectory family. The clock
    /// descriptor is unavailable there; the segment summary is used
    /// instead.
    pub fn segment() -> Self {
        Self {
            traj: TrajStyle::Segment,
            clock_based: false,
            reward: "aslip_old".to_string(),
            ..Self::default()
        }
    }

    /// Width of the action vector accepted by `step`.
    pub fn action_width(&self) -> usize {
        if self.learn_gains {
            NUM_MOTORS + 2 * NUM_MOTORS
        } else {
            NUM_MOTORS
        }
    }

    /// Validate switch combinations that cannot be expressed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.traj == TrajStyle::Segment && self.clock_based {
            // The segment family carries its own descriptor; a clock
            // would alias two different phase encodings.
            return Err(ConfigError::UnknownTrajectoryStyle(
                "segment trajectories cannot be clock based".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = EnvConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.action_width(), 10);
    }

    #[test]
    fn test_learn_gains_widens_action() {
        let cfg = EnvConfig {
            learn_gains: true,
            ..EnvConfig::default()
        };
        assert_eq!(cfg.action_width(), 30);
    }

    #[test]
    fn test_traj_style_parse() {
        assert_eq!(TrajStyle::parse("walking").unwrap(), TrajStyle::Walking);
        assert_eq!(TrajStyle::parse("ASLIP").unwrap(), TrajStyle::Segment);
        assert!(TrajStyle::parse("hopping").is_err());
    }

    #[test]
    fn test_segment_clock_combination_rejected() {
        let cfg = EnvConfig {
            traj: TrajStyle::Segment,
            clock_based: true,
            ..EnvConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
