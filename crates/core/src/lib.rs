//! Nudge Core - shared types for the directive watcher
//!
//! This crate provides:
//! - Configuration loading and validation
//! - Watch targets
//! - Directive comment scanning
//! - Queue tasks and the failure taxonomy

pub mod config;
pub mod error;
pub mod scan;
pub mod target;
pub mod task;

// Re-export main types for convenience
pub use config::{AgentCommandConfig, ConfigError, IgnoreConfig, NudgeConfig, TargetConfig};
pub use error::{TaskError, WatchError};
pub use scan::{classify_line, scan, DirectiveKind, Trigger};
pub use target::{WatchTarget, WatchTargetId};
pub use task::{QueueTask, TaskSink};
