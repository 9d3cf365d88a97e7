//! Per-round trace capture for consensus runs.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::feedback::Direction;

/// State of one measured round, as written to the trace.
#[derive(Debug, Clone, Serialize)]
pub struct RoundTrace {
    pub timestamp_ms: i64,
    pub round: u32,
    pub n_experts: usize,
    pub n_alternatives: usize,
    pub cm: f64,
    pub threshold: f64,
    pub collective_ranking: Vec<usize>,
    pub collective_scores: Vec<f64>,
    pub solution_set: Vec<usize>,
    pub expert_rankings: BTreeMap<String, Vec<usize>>,
    pub degree_alt: Vec<f64>,
    /// Empty when the round converged.
    pub farthest_experts: Vec<String>,
    pub directives: BTreeMap<String, Vec<Direction>>,
    pub accepted_magnitudes: Vec<f64>,
    pub changes_applied: usize,
    /// Set on the final round: `converged` or `round_limit`.
    pub termination: Option<String>,
}

/// Failure to persist a round trace. A failed write aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    /// The round writer has stopped, usually after an earlier write error.
    #[error("round trace writer is gone")]
    Closed,
    #[error("round trace writer failed: {0}")]
    Join(String),
}

/// Receives one [`RoundTrace`] per measured round, in round order.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: RoundTrace) -> Result<(), TraceError>;
}

/// Writes each round as one JSON line from a background thread.
#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<RoundTrace>,
}

/// Handle on the round writer thread.
pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<u32, TraceError>>>,
}

impl TraceWorker {
    /// Wait for the writer to drain. Returns the number of rounds written.
    ///
    /// Every [`JsonlTraceSink`] clone must be dropped first, or this blocks.
    pub fn join(mut self) -> Result<u32, TraceError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TraceError::Join("round writer panicked".to_string()))?,
            None => Ok(0),
        }
    }
}

impl JsonlTraceSink {
    /// Create (or truncate) the file and spawn the writer. Each round line is
    /// flushed as soon as it is written.
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<RoundTrace>();
        let handle = std::thread::spawn(move || write_rounds(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: RoundTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_rounds(
    file: std::fs::File,
    receiver: mpsc::Receiver<RoundTrace>,
) -> Result<u32, TraceError> {
    let mut writer = BufWriter::new(file);
    let mut written = 0u32;
    for round in receiver {
        serde_json::to_writer(&mut writer, &round).map_err(|e| TraceError::Serde(e.to_string()))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        written += 1;
    }
    Ok(written)
}

/// Wall-clock stamp for a round, in milliseconds since the Unix epoch.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(round: u32, termination: Option<&str>) -> RoundTrace {
        RoundTrace {
            timestamp_ms: now_epoch_ms(),
            round,
            n_experts: 1,
            n_alternatives: 2,
            cm: 1.0,
            threshold: 0.85,
            collective_ranking: vec![1, 0],
            collective_scores: vec![0.0, 1.0],
            solution_set: vec![1],
            expert_rankings: BTreeMap::new(),
            degree_alt: vec![1.0, 1.0],
            farthest_experts: vec![],
            directives: BTreeMap::new(),
            accepted_magnitudes: vec![],
            changes_applied: 0,
            termination: termination.map(str::to_string),
        }
    }

    #[test]
    fn rounds_are_readable_before_the_writer_is_joined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rounds.jsonl");
        let (sink, worker) = JsonlTraceSink::new(&path).unwrap();

        sink.record(round(0, None)).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut raw = String::new();
        while std::time::Instant::now() < deadline {
            raw = std::fs::read_to_string(&path).unwrap();
            if raw.ends_with('\n') {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(raw.lines().count(), 1);

        sink.record(round(1, Some("converged"))).unwrap();
        drop(sink);
        assert_eq!(worker.join().unwrap(), 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        let last: serde_json::Value = serde_json::from_str(raw.lines().last().unwrap()).unwrap();
        assert_eq!(last["round"], 1);
        assert_eq!(last["termination"], "converged");
    }

    #[test]
    fn unused_sink_writes_an_empty_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rounds.jsonl");
        let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
        drop(sink);
        assert_eq!(worker.join().unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
