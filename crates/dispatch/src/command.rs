//! Agent runtime backed by external commands
//!
//! Each agent type maps to a configured command line. A session runs that
//! command once per instruction, in the bound file's directory, and turns
//! its stdout into `Info` events and its exit status into the terminal
//! event.

use crate::agent::{AgentError, AgentEvent, AgentHandle, AgentRuntime, SpawnOptions};
use async_trait::async_trait;
use nudge_core::{AgentCommandConfig, NudgeConfig};
use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lines of stderr kept for the failure message
const STDERR_TAIL_LINES: usize = 20;

/// Resolves agent types to configured commands
#[derive(Debug, Clone, Default)]
pub struct CommandAgentRuntime {
    agents: BTreeMap<String, AgentCommandConfig>,
}

impl CommandAgentRuntime {
    pub fn new(agents: BTreeMap<String, AgentCommandConfig>) -> Self {
        Self { agents }
    }

    pub fn from_config(config: &NudgeConfig) -> Self {
        Self::new(config.agents.clone())
    }

    pub fn agent_types(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }
}

#[async_trait]
impl AgentRuntime for CommandAgentRuntime {
    async fn spawn(
        &self,
        agent_type: &str,
        options: SpawnOptions,
    ) -> Result<Box<dyn AgentHandle>, AgentError> {
        if !options.headless {
            return Err(AgentError::new("command agents only run headless"));
        }
        let command = self
            .agents
            .get(agent_type)
            .ok_or_else(|| AgentError::new(format!("no agent configured as '{}'", agent_type)))?;

        Ok(Box::new(CommandSession {
            agent_type: agent_type.to_string(),
            command: command.clone(),
            file: None,
            kill: None,
            waiter: None,
        }))
    }
}

/// One command invocation bound to one file
struct CommandSession {
    agent_type: String,
    command: AgentCommandConfig,
    file: Option<PathBuf>,
    kill: Option<oneshot::Sender<()>>,
    waiter: Option<JoinHandle<()>>,
}

impl CommandSession {
    fn expand_args(&self, file: &Path, prompt: &str, prompt_file: &Path) -> Vec<String> {
        let file = file.to_string_lossy();
        let prompt_file = prompt_file.to_string_lossy();
        self.command
            .args
            .iter()
            .map(|arg| {
                arg.replace("{file}", &file)
                    .replace("{prompt_file}", &prompt_file)
                    .replace("{prompt}", prompt)
            })
            .collect()
    }
}

#[async_trait]
impl AgentHandle for CommandSession {
    async fn add_file(&mut self, path: &Path) -> Result<(), AgentError> {
        if let Some(bound) = &self.file {
            return Err(AgentError::new(format!(
                "session already bound to {}",
                bound.display()
            )));
        }
        if !path.is_file() {
            return Err(AgentError::new(format!("{} is not a file", path.display())));
        }
        self.file = Some(path.to_path_buf());
        Ok(())
    }

    async fn execute(
        &mut self,
        instruction: &str,
    ) -> Result<mpsc::UnboundedReceiver<AgentEvent>, AgentError> {
        if self.waiter.is_some() {
            return Err(AgentError::new("session already executed an instruction"));
        }
        let file = self
            .file
            .clone()
            .ok_or_else(|| AgentError::new("no file bound to session"))?;

        let mut prompt_file = tempfile::Builder::new()
            .prefix("nudge-prompt-")
            .suffix(".md")
            .tempfile()
            .map_err(|e| AgentError::new(format!("failed to create prompt file: {}", e)))?;
        let written = prompt_file.write_all(instruction.as_bytes());
        written
            .and_then(|()| prompt_file.as_file_mut().flush())
            .map_err(|e| AgentError::new(format!("failed to write prompt file: {}", e)))?;

        let args = self.expand_args(&file, instruction, prompt_file.path());
        let mut cmd = Command::new(&self.command.command);
        cmd.args(&args)
            .envs(&self.command.env)
            .stdin(if self.command.stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        debug!("Running {} {:?}", self.command.command, args);
        let child = cmd.spawn().map_err(|e| {
            AgentError::new(format!(
                "failed to start '{}' ({}): {}",
                self.agent_type, self.command.command, e
            ))
        })?;

        let stdin_payload = self.command.stdin.then(|| instruction.to_string());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        self.kill = Some(kill_tx);
        self.waiter = Some(tokio::spawn(supervise(
            child,
            stdin_payload,
            prompt_file,
            kill_rx,
            events_tx,
            self.agent_type.clone(),
        )));

        Ok(events_rx)
    }

    async fn dispose(mut self: Box<Self>) {
        if let Some(kill) = self.kill.take() {
            // Err means the child already exited
            let _ = kill.send(());
        }
        if let Some(waiter) = self.waiter.take() {
            if let Err(e) = waiter.await {
                warn!("'{}' session supervisor failed: {}", self.agent_type, e);
            }
        }
    }
}

/// Pump output, wait for exit or a kill request, report the result
async fn supervise(
    mut child: Child,
    stdin_payload: Option<String>,
    prompt_file: NamedTempFile,
    kill: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<AgentEvent>,
    agent_type: String,
) {
    if let (Some(payload), Some(mut stdin)) = (stdin_payload, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                debug!("Agent stdin closed early: {}", e);
            }
        });
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let info_events = events.clone();
    let pump_stdout = async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = info_events.send(AgentEvent::Info(line));
            }
        }
    };

    let collect_stderr = async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    };

    let wait = async {
        tokio::select! {
            status = child.wait() => Some(status),
            Ok(()) = kill => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill '{}' agent: {}", agent_type, e);
                }
                None
            }
        }
    };

    let ((), stderr_tail, status) = tokio::join!(pump_stdout, collect_stderr, wait);
    drop(prompt_file);

    let event = match status {
        Some(Ok(status)) if status.success() => AgentEvent::Completed,
        Some(Ok(status)) if stderr_tail.is_empty() => {
            AgentEvent::Error(format!("'{}' exited with {}", agent_type, status))
        }
        Some(Ok(status)) => AgentEvent::Error(format!(
            "'{}' exited with {}: {}",
            agent_type, status, stderr_tail
        )),
        Some(Err(e)) => AgentEvent::Error(format!("failed to wait for '{}': {}", agent_type, e)),
        None => AgentEvent::Error(format!("'{}' session was disposed", agent_type)),
    };
    let _ = events.send(event);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str, stdin: bool) -> CommandAgentRuntime {
        let mut agents = BTreeMap::new();
        agents.insert(
            "sh".to_string(),
            AgentCommandConfig {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string(), "nudge".to_string()],
                stdin,
                env: BTreeMap::from([("NUDGE_TEST".to_string(), "yes".to_string())]),
            },
        );
        CommandAgentRuntime::new(agents)
    }

    async fn drain(mut events: mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        seen
    }

    fn fixture() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.py");
        std::fs::write(&file, "# AI! say hi\n").unwrap();
        (temp_dir, file)
    }

    #[tokio::test]
    async fn test_unknown_agent_and_interactive_spawn_fail() {
        let runtime = sh("true", false);
        assert!(runtime.spawn("ghost", SpawnOptions::headless()).await.is_err());
        assert!(runtime
            .spawn("sh", SpawnOptions { headless: false })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_stdout_lines_become_info_then_completed() {
        let (_temp_dir, file) = fixture();
        let runtime = sh("echo \"$NUDGE_TEST\"; echo done", false);

        let mut session = runtime.spawn("sh", SpawnOptions::headless()).await.unwrap();
        session.add_file(&file).await.unwrap();
        let events = drain(session.execute("do it").await.unwrap()).await;
        session.dispose().await;

        assert_eq!(
            events,
            vec![
                AgentEvent::Info("yes".to_string()),
                AgentEvent::Info("done".to_string()),
                AgentEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_placeholders_and_stdin_reach_the_command() {
        let (_temp_dir, file) = fixture();
        let mut agents = BTreeMap::new();
        agents.insert(
            "sh".to_string(),
            AgentCommandConfig {
                command: "sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    "cat \"$1\"; echo; echo \"$2\"; cat".to_string(),
                    "nudge".to_string(),
                    "{prompt_file}".to_string(),
                    "file={file}".to_string(),
                ],
                stdin: true,
                env: BTreeMap::new(),
            },
        );
        let runtime = CommandAgentRuntime::new(agents);

        let mut session = runtime.spawn("sh", SpawnOptions::headless()).await.unwrap();
        session.add_file(&file).await.unwrap();
        let events = drain(session.execute("fix the bug").await.unwrap()).await;
        session.dispose().await;

        assert_eq!(
            events,
            vec![
                AgentEvent::Info("fix the bug".to_string()),
                AgentEvent::Info(format!("file={}", file.display())),
                AgentEvent::Info("fix the bug".to_string()),
                AgentEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr_tail() {
        let (_temp_dir, file) = fixture();
        let runtime = sh("echo 'rate limited' >&2; exit 3", false);

        let mut session = runtime.spawn("sh", SpawnOptions::headless()).await.unwrap();
        session.add_file(&file).await.unwrap();
        let events = drain(session.execute("do it").await.unwrap()).await;
        session.dispose().await;

        match events.last() {
            Some(AgentEvent::Error(message)) => assert!(message.contains("rate limited")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispose_kills_running_command() {
        let (_temp_dir, file) = fixture();
        let runtime = sh("exec sleep 30", false);

        let mut session = runtime.spawn("sh", SpawnOptions::headless()).await.unwrap();
        session.add_file(&file).await.unwrap();
        let events = session.execute("wait").await.unwrap();
        session.dispose().await;

        assert!(matches!(
            drain(events).await.last(),
            Some(AgentEvent::Error(message)) if message.contains("disposed")
        ));
    }

    #[tokio::test]
    async fn test_session_requires_a_bound_file() {
        let (temp_dir, file) = fixture();
        let runtime = sh("true", false);

        let mut session = runtime.spawn("sh", SpawnOptions::headless()).await.unwrap();
        assert!(session.execute("x").await.is_err());
        assert!(session.add_file(temp_dir.path()).await.is_err());
        session.add_file(&file).await.unwrap();
        assert!(session.add_file(&file).await.is_err());
        session.dispose().await;
    }
}
