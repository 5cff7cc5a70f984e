//! In-memory reader and scripted agent runtime for tests

use crate::agent::{AgentError, AgentEvent, AgentHandle, AgentRuntime, SpawnOptions};
use crate::reader::FileReader;
use async_trait::async_trait;
use nudge_core::{scan, Trigger};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Build the trigger found on `line` of `content`
pub(crate) fn modify_trigger(path: &str, content: &str, line: usize) -> Trigger {
    scan(Path::new(path), content)
        .into_iter()
        .find(|trigger| trigger.line_number == line)
        .unwrap()
}

#[derive(Debug, Default)]
pub(crate) struct MemoryReader {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryReader {
    pub(crate) fn set(&self, path: &str, content: &str) {
        self.files
            .lock()
            .insert(PathBuf::from(path), content.to_string());
    }
}

#[async_trait]
impl FileReader for MemoryReader {
    async fn read(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .get(path)
            .filter(|content| !content.is_empty())
            .cloned()
    }
}

/// How every session spawned by a `ScriptedRuntime` behaves
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Complete,
    Fail(String),
    SpawnError(String),
    CompleteAfter(Duration),
}

#[derive(Debug, Default, Clone)]
pub(crate) struct RuntimeLog {
    pub spawned: Vec<String>,
    pub files: Vec<PathBuf>,
    pub instructions: Vec<String>,
    pub disposed: usize,
}

pub(crate) struct ScriptedRuntime {
    script: Script,
    log: Arc<Mutex<RuntimeLog>>,
}

impl ScriptedRuntime {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(RuntimeLog::default())),
        }
    }

    pub(crate) fn log(&self) -> RuntimeLog {
        self.log.lock().clone()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn spawn(
        &self,
        agent_type: &str,
        options: SpawnOptions,
    ) -> Result<Box<dyn AgentHandle>, AgentError> {
        assert!(options.headless);
        if let Script::SpawnError(message) = &self.script {
            return Err(AgentError::new(message.clone()));
        }
        self.log.lock().spawned.push(agent_type.to_string());
        Ok(Box::new(ScriptedHandle {
            script: self.script.clone(),
            log: self.log.clone(),
        }))
    }
}

struct ScriptedHandle {
    script: Script,
    log: Arc<Mutex<RuntimeLog>>,
}

#[async_trait]
impl AgentHandle for ScriptedHandle {
    async fn add_file(&mut self, path: &Path) -> Result<(), AgentError> {
        self.log.lock().files.push(path.to_path_buf());
        Ok(())
    }

    async fn execute(
        &mut self,
        instruction: &str,
    ) -> Result<mpsc::UnboundedReceiver<AgentEvent>, AgentError> {
        self.log.lock().instructions.push(instruction.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(AgentEvent::Info("working".to_string()));

        match &self.script {
            Script::Complete => {
                let _ = tx.send(AgentEvent::Completed);
            }
            Script::Fail(message) => {
                let _ = tx.send(AgentEvent::Error(message.clone()));
            }
            Script::CompleteAfter(delay) => {
                let delay = *delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(AgentEvent::Completed);
                });
            }
            Script::SpawnError(_) => unreachable!(),
        }
        Ok(rx)
    }

    async fn dispose(self: Box<Self>) {
        self.log.lock().disposed += 1;
    }
}
