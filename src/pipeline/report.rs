//! Cancellation flag and run summaries shared by both pipelines

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation, checked at the top of every loop iteration
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which way audio flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Microphone to server
    Send,
    /// Server to speaker
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "streaming"),
            Direction::Receive => write!(f, "playback"),
        }
    }
}

/// Why a pipeline loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Cancelled,
    EndOfStream,
    Failed(String),
}

impl Termination {
    pub fn failed(err: impl fmt::Display) -> Self {
        Termination::Failed(err.to_string())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Termination::Failed(_))
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub direction: Direction,
    pub chunks: u64,
    pub bytes: u64,
    pub termination: Termination,
}

impl PipelineReport {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            chunks: 0,
            bytes: 0,
            termination: Termination::Cancelled,
        }
    }

    pub(super) fn record(&mut self, bytes: usize) {
        self.chunks += 1;
        self.bytes += bytes as u64;
    }

    /// Set the outcome and log the summary
    pub(super) fn finish(mut self, termination: Termination) -> Self {
        self.termination = termination;
        match &self.termination {
            Termination::Failed(reason) => tracing::error!(
                "{} error after {} chunks ({} bytes): {}",
                self.direction,
                self.chunks,
                self.bytes,
                reason
            ),
            other => tracing::info!(
                "{} stopped ({:?}): {} chunks, {} bytes",
                self.direction,
                other,
                self.chunks,
                self.bytes
            ),
        }
        self
    }

    /// Report for a pipeline that could not start
    pub(super) fn failed(direction: Direction, err: impl fmt::Display) -> Self {
        Self::new(direction).finish(Termination::failed(err))
    }
}
