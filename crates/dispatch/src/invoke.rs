//! Agent invocation for a single directive
//!
//! One headless session per Modify trigger. The file is re-read right before
//! the session starts so the agent sees what is on disk now, not what was
//! scanned. A session that outlives the timeout is left running and drained
//! in the background.

use crate::agent::{AgentEvent, AgentHandle, AgentRuntime, SpawnOptions};
use crate::reader::FileReader;
use nudge_core::{TaskError, Trigger};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What the agent is told for one directive
#[derive(Debug, Clone)]
pub struct InstructionPayload<'a> {
    pub trigger: &'a Trigger,
    /// Full file content as read immediately before spawning
    pub content: &'a str,
}

impl<'a> InstructionPayload<'a> {
    pub fn new(trigger: &'a Trigger, content: &'a str) -> Self {
        Self { trigger, content }
    }

    /// Render the instruction handed to `AgentHandle::execute`
    pub fn render(&self) -> String {
        let path = self.trigger.file_path.display();
        let fence = if self.content.contains("```") { "````" } else { "```" };

        let mut out = String::with_capacity(self.content.len() + 512);
        out.push_str(&format!("File: {}\n\n", path));
        out.push_str(&format!(
            "Instruction (line {}):\n{}\n\n",
            self.trigger.line_number, self.trigger.instruction_text
        ));
        out.push_str(&format!("Current content of {}:\n{}\n", path, fence));
        out.push_str(self.content);
        if !self.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(fence);
        out.push_str("\n\n");
        out.push_str(
            "Required: when the change is done, delete the comment line that \
             carries this instruction. It currently reads:\n",
        );
        out.push_str(self.trigger.raw_line.trim());
        out.push('\n');
        out
    }
}

/// How one invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The agent reported completion
    Completed,
    /// Nothing to do: the line is gone or a session for it is already running
    Skipped,
}

type InFlightKey = (PathBuf, String);

/// Directives with a live session, keyed by file and exact line
#[derive(Debug, Default, Clone)]
struct InFlight(Arc<Mutex<HashSet<InFlightKey>>>);

impl InFlight {
    fn claim(&self, trigger: &Trigger) -> Option<InFlightGuard> {
        let key = (trigger.file_path.clone(), trigger.raw_line.clone());
        if !self.0.lock().insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            key,
        })
    }

    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// Releases the claim when the session is disposed
struct InFlightGuard {
    set: InFlight,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.0.lock().remove(&self.key);
    }
}

/// Runs agent sessions for Modify triggers
#[derive(Clone)]
pub struct AgentInvoker {
    runtime: Arc<dyn AgentRuntime>,
    reader: Arc<dyn FileReader>,
    timeout: Duration,
    in_flight: InFlight,
}

impl AgentInvoker {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        reader: Arc<dyn FileReader>,
        timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            reader,
            timeout,
            in_flight: InFlight::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of sessions currently running, detached ones included
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Run one session for `trigger` and wait for it, up to the timeout
    pub async fn invoke(
        &self,
        trigger: &Trigger,
        agent_type: &str,
    ) -> Result<SessionOutcome, TaskError> {
        let content = self
            .reader
            .read(&trigger.file_path)
            .await
            .ok_or_else(|| TaskError::Read {
                path: trigger.file_path.clone(),
            })?;

        if !trigger.is_present_in(&content) {
            info!("Directive already handled, skipping: {}", trigger);
            return Ok(SessionOutcome::Skipped);
        }

        let Some(guard) = self.in_flight.claim(trigger) else {
            info!("Session already running for {}, skipping", trigger);
            return Ok(SessionOutcome::Skipped);
        };

        let instruction = InstructionPayload::new(trigger, &content).render();
        let agent_error = |reason: String| TaskError::Agent {
            path: trigger.file_path.clone(),
            line: trigger.line_number,
            reason,
        };

        let mut handle = self
            .runtime
            .spawn(agent_type, SpawnOptions::headless())
            .await
            .map_err(|e| TaskError::Spawn {
                agent_type: agent_type.to_string(),
                reason: e.to_string(),
            })?;

        info!("Started '{}' session for {}", agent_type, trigger);

        if let Err(e) = handle.add_file(&trigger.file_path).await {
            handle.dispose().await;
            return Err(agent_error(e.to_string()));
        }

        let mut events = match handle.execute(&instruction).await {
            Ok(events) => events,
            Err(e) => {
                handle.dispose().await;
                return Err(agent_error(e.to_string()));
            }
        };

        let waited =
            tokio::time::timeout(self.timeout, wait_for_completion(&mut events, trigger)).await;

        match waited {
            Ok(result) => {
                handle.dispose().await;
                drop(guard);
                result.map_err(agent_error)?;
                info!("Session completed for {}", trigger);
                Ok(SessionOutcome::Completed)
            }
            Err(_) => {
                warn!(
                    "Session for {} still running after {:?}, no longer waiting",
                    trigger, self.timeout
                );
                detach(handle, events, guard, trigger.clone());
                Err(TaskError::Timeout {
                    path: trigger.file_path.clone(),
                    line: trigger.line_number,
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Consume events until the session reports a terminal state
async fn wait_for_completion(
    events: &mut mpsc::UnboundedReceiver<AgentEvent>,
    trigger: &Trigger,
) -> Result<(), String> {
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Info(message) => {
                debug!("{}:{}: {}", trigger.file_path.display(), trigger.line_number, message)
            }
            AgentEvent::Error(message) => return Err(message),
            AgentEvent::Completed => return Ok(()),
        }
    }
    Err("session ended without reporting completion".to_string())
}

/// Let a timed-out session finish on its own, then dispose it
fn detach(
    handle: Box<dyn AgentHandle>,
    mut events: mpsc::UnboundedReceiver<AgentEvent>,
    guard: InFlightGuard,
    trigger: Trigger,
) {
    tokio::spawn(async move {
        let _guard = guard;
        match wait_for_completion(&mut events, &trigger).await {
            Ok(()) => info!("Detached session completed for {}", trigger),
            Err(reason) => warn!("Detached session for {} ended: {}", trigger, reason),
        }
        handle.dispose().await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{modify_trigger, MemoryReader, Script, ScriptedRuntime};

    const SOURCE: &str = "def add(a, b):\n    # make this typed AI!\n    return a + b\n";

    fn invoker(runtime: &Arc<ScriptedRuntime>, reader: &Arc<MemoryReader>) -> AgentInvoker {
        AgentInvoker::new(runtime.clone(), reader.clone(), Duration::from_secs(30))
    }

    #[test]
    fn test_payload_carries_content_instruction_and_removal() {
        let trigger = modify_trigger("/repo/a.py", SOURCE, 2);
        let rendered = InstructionPayload::new(&trigger, SOURCE).render();

        assert!(rendered.contains("File: /repo/a.py"));
        assert!(rendered.contains("Instruction (line 2):\nmake this typed AI!"));
        assert!(rendered.contains(SOURCE));
        assert!(rendered.contains("delete the comment line"));
        assert!(rendered.ends_with("# make this typed AI!\n"));
    }

    #[test]
    fn test_payload_fence_survives_markdown_content() {
        let content = "```rust\n// AI! fix\n```\n";
        let trigger = modify_trigger("/repo/README.md", content, 2);
        let rendered = InstructionPayload::new(&trigger, content).render();
        assert!(rendered.contains("````\n```rust"));
    }

    #[tokio::test]
    async fn test_invoke_completes_and_disposes() {
        let reader = Arc::new(MemoryReader::default());
        reader.set("/repo/a.py", SOURCE);
        let runtime = Arc::new(ScriptedRuntime::new(Script::Complete));
        let trigger = modify_trigger("/repo/a.py", SOURCE, 2);

        let outcome = invoker(&runtime, &reader).invoke(&trigger, "aider").await.unwrap();

        assert_eq!(outcome, SessionOutcome::Completed);
        let log = runtime.log();
        assert_eq!(log.spawned, vec!["aider".to_string()]);
        assert_eq!(log.files, vec![PathBuf::from("/repo/a.py")]);
        assert_eq!(log.instructions.len(), 1);
        assert!(log.instructions[0].contains("make this typed AI!"));
        assert_eq!(log.disposed, 1);
    }

    #[tokio::test]
    async fn test_stale_trigger_spawns_nothing() {
        let reader = Arc::new(MemoryReader::default());
        reader.set("/repo/a.py", "def add(a: int, b: int) -> int:\n    return a + b\n");
        let runtime = Arc::new(ScriptedRuntime::new(Script::Complete));
        let trigger = modify_trigger("/repo/a.py", SOURCE, 2);

        let outcome = invoker(&runtime, &reader).invoke(&trigger, "aider").await.unwrap();

        assert_eq!(outcome, SessionOutcome::Skipped);
        assert!(runtime.log().spawned.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let reader = Arc::new(MemoryReader::default());
        let runtime = Arc::new(ScriptedRuntime::new(Script::Complete));
        let trigger = modify_trigger("/repo/a.py", SOURCE, 2);

        let err = invoker(&runtime, &reader).invoke(&trigger, "aider").await.unwrap_err();

        assert!(matches!(err, TaskError::Read { .. }));
        assert!(runtime.log().spawned.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_and_agent_failures() {
        let reader = Arc::new(MemoryReader::default());
        reader.set("/repo/a.py", SOURCE);
        let trigger = modify_trigger("/repo/a.py", SOURCE, 2);

        let runtime = Arc::new(ScriptedRuntime::new(Script::SpawnError("no such agent".into())));
        let err = invoker(&runtime, &reader).invoke(&trigger, "ghost").await.unwrap_err();
        assert!(matches!(err, TaskError::Spawn { ref agent_type, .. } if agent_type == "ghost"));

        let runtime = Arc::new(ScriptedRuntime::new(Script::Fail("model refused".into())));
        let invoker = invoker(&runtime, &reader);
        let err = invoker.invoke(&trigger, "aider").await.unwrap_err();
        assert!(matches!(err, TaskError::Agent { line: 2, ref reason, .. } if reason == "model refused"));
        assert_eq!(runtime.log().disposed, 1);
        assert_eq!(invoker.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_detaches_session_until_it_finishes() {
        let reader = Arc::new(MemoryReader::default());
        reader.set("/repo/a.py", SOURCE);
        let runtime = Arc::new(ScriptedRuntime::new(Script::CompleteAfter(
            Duration::from_secs(120),
        )));
        let invoker = invoker(&runtime, &reader);
        let trigger = modify_trigger("/repo/a.py", SOURCE, 2);

        let err = invoker.invoke(&trigger, "aider").await.unwrap_err();
        assert!(err.is_timeout());
        // Not killed at the timeout
        assert_eq!(runtime.log().disposed, 0);
        assert_eq!(invoker.in_flight(), 1);

        // A second edit while the first session runs does not start another
        let outcome = invoker.invoke(&trigger, "aider").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Skipped);
        assert_eq!(runtime.log().spawned.len(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        assert_eq!(runtime.log().disposed, 1);
        assert_eq!(invoker.in_flight(), 0);
    }
}
