//! Nudge Dispatch - from stabilized files to agent sessions
//!
//! This crate provides:
//! - The bounded-concurrency dispatch queue
//! - The per-task scan and dispatch pipeline
//! - The agent invocation protocol and runtime traits
//! - A command-backed agent runtime

pub mod agent;
pub mod command;
pub mod invoke;
pub mod pipeline;
pub mod queue;
pub mod reader;

#[cfg(test)]
mod test_support;

pub use agent::{AgentError, AgentEvent, AgentHandle, AgentRuntime, SpawnOptions};
pub use command::CommandAgentRuntime;
pub use invoke::{AgentInvoker, InstructionPayload, SessionOutcome};
pub use pipeline::DirectivePipeline;
pub use queue::{DispatchQueue, QueueClosed, QueueHandle, QueueStats, TaskOutcome, TaskProcessor};
pub use reader::{FileReader, FsReader};
