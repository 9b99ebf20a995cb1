// src/main.rs
//
// Research-harness CLI for stridesim.
//
// Runs deterministic rollouts of the gait environment over the in-tree
// kinematic backend with synthetic reference trajectories, and prints
// per-run reward / episode-length statistics. Useful for smoke-testing
// reward variants and randomization settings without a physics engine.
//
// Examples:
//   cargo run -- --episodes 20 --steps 300 --seed 1
//   cargo run -- --traj segment --reward aslip_old --episodes 5 -v
//   cargo run -- --reward clock_smooth --log steps.jsonl

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

use stridesim::logging::{EventSink, FileSink, NoopSink};
use stridesim::metrics::OnlineStats;
use stridesim::sim::KinematicSim;
use stridesim::trajectory::{synthetic_segment_family, synthetic_walking};
use stridesim::{EnvConfig, GaitEnv, TrajStyle, TrajectorySource};

#[derive(Debug, Parser)]
#[command(
    name = "stridesim",
    about = "Bipedal gait environment rollout harness",
    version
)]
struct Args {
    /// Number of episodes to run.
    #[arg(long, default_value_t = 10)]
    episodes: u64,

    /// Maximum control steps per episode.
    #[arg(long, default_value_t = 300)]
    steps: u64,

    /// Base seed; episode i runs with seed + i.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Trajectory style: walking | stepping | segment.
    #[arg(long, default_value = "walking")]
    traj: String,

    /// Reward variant tag.
    #[arg(long, default_value = "iros_paper")]
    reward: String,

    /// Disable per-episode dynamics randomization.
    #[arg(long)]
    no_rand: bool,

    /// Observation history depth.
    #[arg(long, default_value_t = 0)]
    history: u64,

    /// Pin the commanded speed instead of sampling it.
    #[arg(long)]
    fixed_speed: Option<f64>,

    /// Write per-step JSONL telemetry to this path.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Verbosity: -v prints per-episode lines.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn main() -> ExitCode {
    let args = Args::parse();

    let traj = match TrajStyle::parse(&args.traj) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("stridesim: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cfg = EnvConfig {
        traj,
        clock_based: traj != TrajStyle::Segment,
        dynamics_randomization: !args.no_rand,
        reward: args.reward.clone(),
        history: args.history as usize,
        fixed_speed: args.fixed_speed,
        ..EnvConfig::default()
    };

    let cfg_hash = fnv1a64(&format!("{cfg:?}"));
    println!(
        "stridesim | cfg={} | cfg_hash=0x{:016x} | traj={} | reward={} | episodes={} | seed={}",
        cfg.version,
        cfg_hash,
        traj.as_str(),
        cfg.reward,
        args.episodes,
        args.seed
    );

    let source = match traj {
        TrajStyle::Segment => TrajectorySource::Family(synthetic_segment_family(28)),
        _ => TrajectorySource::Single(synthetic_walking(1700, cfg.simrate)),
    };

    let mut env = match GaitEnv::new(cfg, KinematicSim::new(), source, None) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("stridesim: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut sink: Box<dyn EventSink> = match args.log.as_deref() {
        Some(path) => match FileSink::create(path) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                eprintln!("stridesim: cannot open {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(NoopSink),
    };

    let mut reward_stats = OnlineStats::default();
    let mut length_stats = OnlineStats::default();
    let mut terminated_early = 0u64;

    for episode in 0..args.episodes {
        env.reset(Some(args.seed + episode));
        let action = vec![0.0; env.action_width()];

        let mut episode_reward = 0.0;
        let mut length = 0u64;
        for _ in 0..args.steps {
            let result = env.step(&action);
            sink.log_step(episode, &result);
            episode_reward += result.reward;
            length += 1;
            if result.done {
                terminated_early += 1;
                break;
            }
        }

        reward_stats.add(episode_reward / length.max(1) as f64);
        length_stats.add(length as f64);

        if args.verbose > 0 {
            println!(
                "episode {episode:>4} | seed={} | len={length:>4} | mean_reward={:.4} | speed={:.1}",
                env.seed(),
                episode_reward / length.max(1) as f64,
                env.speed()
            );
        }
    }

    println!(
        "reward mean={:.4} std={:.4} min={:.4} max={:.4}",
        reward_stats.mean(),
        reward_stats.std_dev(),
        reward_stats.min(),
        reward_stats.max()
    );
    println!(
        "length mean={:.1} min={:.0} max={:.0} | early terminations {}/{}",
        length_stats.mean(),
        length_stats.min(),
        length_stats.max(),
        terminated_early,
        args.episodes
    );

    ExitCode::SUCCESS
}
