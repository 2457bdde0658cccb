//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Checkpoint type tag used by the blocks-mined job.
pub const BLOCKS_MINED_JOB: &str = "BLOCKS_MINED";

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Checkpoint type tag for this job.
    pub job_type: String,
    /// Value the checkpoint row is created with when absent.
    pub initial_checkpoint: u64,
    /// Payee threshold as a fraction of the expected subsidy
    /// (`numerator / denominator`); an output must strictly exceed it.
    pub threshold_numerator: u64,
    pub threshold_denominator: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            job_type: BLOCKS_MINED_JOB.into(),
            initial_checkpoint: 0,
            threshold_numerator: 6,
            threshold_denominator: 10,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.job_type.is_empty() {
            return Err(IndexerError::Config("job_type must not be empty".into()));
        }
        if self.threshold_denominator == 0 {
            return Err(IndexerError::Config(
                "threshold_denominator must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Runtime state of the catch-up worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Starting,
    /// Caught up (or waiting for the next tip after a failed pass).
    Idle,
    /// A catch-up pass towards `target` is executing.
    Running { target: u64 },
    /// Shut down.
    Stopped,
}

impl IndexerState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Idle => write!(f, "idle"),
            Self::Running { target } => write!(f, "running(target={target})"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot published by the orchestrator after every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerStatus {
    pub state: IndexerState,
    pub last_checked: u64,
    pub observed_tip: u64,
}
