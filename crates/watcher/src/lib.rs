//! File system watching for nudge
//!
//! This crate provides:
//! - A notify-backed watch adapter per target
//! - Ignore rules (built-in, .gitignore, .nudgeignore, config)
//! - Per-path debouncing into stable queue tasks

pub mod adapter;
pub mod debounce;
pub mod filter;

pub use adapter::TargetWatcher;
pub use debounce::{DebounceDriver, DebounceOutcome, DebounceStats, DebounceTracker, PathState};
pub use filter::IgnoreRules;

use nudge_core::WatchTargetId;
use std::path::PathBuf;

/// File system event for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub target: WatchTargetId,
    /// Path that changed (target root for watcher errors without a path)
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(target: WatchTargetId, path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            target,
            path: path.into(),
            kind,
        }
    }
}

/// Type of file system event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    /// File appeared (created or renamed into place)
    Add,
    /// File content changed
    Change,
    /// File removed or renamed away
    Unlink,
    /// The underlying watcher reported a failure
    Error(String),
}
