//! Failure taxonomy for the watch and dispatch pipeline
//!
//! None of these are retried. A `TaskError` ends the task it belongs to; a
//! `WatchError` ends the target it belongs to.

use crate::target::WatchTargetId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a queued task did not complete
#[derive(Debug, Error)]
pub enum TaskError {
    /// File missing, unreadable or empty at task time
    #[error("could not read {path}")]
    Read { path: PathBuf },

    /// Content could not be scanned for directives
    #[error("could not scan {path}: {reason}")]
    Scan { path: PathBuf, reason: String },

    /// The runtime could not start a session
    #[error("failed to spawn '{agent_type}' session: {reason}")]
    Spawn { agent_type: String, reason: String },

    /// The session reported a failure
    #[error("agent session failed on {path}:{line}: {reason}")]
    Agent {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The session did not finish in time; it is left running
    #[error("agent session on {path}:{line} timed out after {timeout:?}")]
    Timeout {
        path: PathBuf,
        line: usize,
        timeout: Duration,
    },

    /// Task names a target the pipeline does not know
    #[error("unknown watch target '{0}'")]
    UnknownTarget(WatchTargetId),
}

impl TaskError {
    /// Timeouts are logged as warnings, everything else as errors
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }
}

/// A watcher failure, fatal to its target only
#[derive(Debug, Error)]
#[error("watch target '{target}' failed: {message}")]
pub struct WatchError {
    pub target: WatchTargetId,
    pub message: String,
}
