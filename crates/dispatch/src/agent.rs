//! Agent runtime interface
//!
//! The runtime that actually edits files is external. Sessions are spawned
//! per directive, bound to one file, given one instruction, and report
//! progress as a stream of `AgentEvent`s ending in `Completed` or `Error`.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

/// Progress reported by a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Info(String),
    Error(String),
    Completed,
}

/// How a session is started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnOptions {
    /// No human in the loop
    pub headless: bool,
}

impl SpawnOptions {
    pub fn headless() -> Self {
        Self { headless: true }
    }
}

/// Runtime-side failure before or while starting a session
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AgentError(pub String);

impl AgentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Spawns agent sessions by agent type
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn spawn(
        &self,
        agent_type: &str,
        options: SpawnOptions,
    ) -> Result<Box<dyn AgentHandle>, AgentError>;
}

/// One live agent session
#[async_trait]
pub trait AgentHandle: Send {
    /// Bind a file into the session's working context
    async fn add_file(&mut self, path: &Path) -> Result<(), AgentError>;

    /// Start executing a free-form instruction
    ///
    /// The receiver yields `Info` events until a terminal `Completed` or
    /// `Error`. A receiver that closes without either means the session died.
    async fn execute(
        &mut self,
        instruction: &str,
    ) -> Result<mpsc::UnboundedReceiver<AgentEvent>, AgentError>;

    /// Release the session, stopping it if it is still running
    async fn dispose(self: Box<Self>);
}
