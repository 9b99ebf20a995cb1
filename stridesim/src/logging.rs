// src/logging.rs
//
// Telemetry sinks for rollout harnesses.
// - EventSink: trait consumed by the episode runners
// - NoopSink:  discards all events
// - FileSink:  one JSON line per control step for offline analysis
//
// Logging must never take the environment down: I/O errors disable the
// sink instead of propagating.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::env::StepResult;

/// Abstract sink for per-step telemetry.
pub trait EventSink {
    fn log_step(&mut self, episode: u64, result: &StepResult);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_step(&mut self, _episode: u64, _result: &StepResult) {
        // intentionally no-op
    }
}

/// Compact per-step record written by FileSink.
#[derive(Debug, Serialize)]
struct StepRecord<'a> {
    episode: u64,
    step: u64,
    phase: usize,
    counter: u32,
    speed: f64,
    stride_count: u32,
    reward: f64,
    done: bool,
    termination_reason: Option<&'a str>,
}

/// JSONL file sink. Each control step is one JSON object per line.
pub struct FileSink {
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a new sink writing to `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }
}

impl EventSink for FileSink {
    fn log_step(&mut self, episode: u64, result: &StepResult) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let record = StepRecord {
            episode,
            step: result.info.step,
            phase: result.info.phase,
            counter: result.info.counter,
            speed: result.info.speed,
            stride_count: result.info.stride_count,
            reward: result.reward,
            done: result.done,
            termination_reason: result.info.termination_reason.map(|r| r.as_str()),
        };

        let line = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(_) => return,
        };

        if writeln!(writer, "{line}").is_err() {
            // Stop logging rather than crash the rollout.
            self.writer = None;
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{StepInfo, StepResult};

    fn sample_result() -> StepResult {
        StepResult {
            observation: vec![0.0; 4],
            reward: 0.82,
            done: false,
            info: StepInfo {
                step: 3,
                phase: 5,
                counter: 0,
                speed: 1.0,
                stride_count: 2,
                termination_reason: None,
                randomization: None,
            },
        }
    }

    #[test]
    fn test_file_sink_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.jsonl");

        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.log_step(0, &sample_result());
            sink.log_step(0, &sample_result());
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["reward"], 0.82);
        assert_eq!(parsed["phase"], 5);
    }

    #[test]
    fn test_noop_sink_is_silent() {
        let mut sink = NoopSink;
        sink.log_step(0, &sample_result());
    }
}
