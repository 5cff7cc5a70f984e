//! Per-task processing: read, scan, dispatch
//!
//! A task moves through `scanning` and then, if the file carries Modify
//! directives, dispatches them one at a time in line order. The first
//! failing directive ends the task.

use crate::invoke::{AgentInvoker, SessionOutcome};
use crate::queue::{TaskOutcome, TaskProcessor};
use crate::reader::FileReader;
use async_trait::async_trait;
use nudge_core::{scan, DirectiveKind, QueueTask, TaskError, WatchTarget, WatchTargetId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Scans stabilized files and hands Modify directives to the agent
pub struct DirectivePipeline {
    targets: HashMap<WatchTargetId, WatchTarget>,
    reader: Arc<dyn FileReader>,
    invoker: AgentInvoker,
}

impl DirectivePipeline {
    pub fn new(
        targets: impl IntoIterator<Item = WatchTarget>,
        reader: Arc<dyn FileReader>,
        invoker: AgentInvoker,
    ) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|target| (target.id.clone(), target))
                .collect(),
            reader,
            invoker,
        }
    }

    pub fn invoker(&self) -> &AgentInvoker {
        &self.invoker
    }
}

#[async_trait]
impl TaskProcessor for DirectivePipeline {
    async fn process(&self, task: &QueueTask) -> Result<TaskOutcome, TaskError> {
        let target = self
            .targets
            .get(&task.target)
            .ok_or_else(|| TaskError::UnknownTarget(task.target.clone()))?;

        let content = self
            .reader
            .read(&task.path)
            .await
            .ok_or_else(|| TaskError::Read {
                path: task.path.clone(),
            })?;

        let triggers = scan(&task.path, &content);
        let mut outcome = TaskOutcome {
            triggers: triggers.len(),
            ..TaskOutcome::default()
        };

        for trigger in &triggers {
            match trigger.kind {
                DirectiveKind::Modify => {
                    match self.invoker.invoke(trigger, &target.agent_type).await? {
                        SessionOutcome::Completed => outcome.sessions_completed += 1,
                        SessionOutcome::Skipped => outcome.skipped += 1,
                    }
                }
                DirectiveKind::Question => info!("Question noted, not dispatched: {}", trigger),
                DirectiveKind::Note => debug!("Context note: {}", trigger),
            }
        }

        Ok(outcome)
    }
}
