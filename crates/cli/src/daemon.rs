//! Daemon lifecycle management
//!
//! Wires watchers, the debounce driver and the dispatch queue together and
//! runs them until ctrl-c or SIGTERM.

use crate::locks::{self, DaemonLock, LockContent};
use crate::util;
use anyhow::{Context, Result};
use nudge_core::{NudgeConfig, WatchTarget, WatchTargetId};
use nudge_dispatch::{
    AgentInvoker, CommandAgentRuntime, DirectivePipeline, DispatchQueue, FileReader, FsReader,
};
use nudge_watcher::{DebounceDriver, DebounceTracker, IgnoreRules, TargetWatcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Run the daemon in the current process until a shutdown signal
pub async fn run(config_path: &Path) -> Result<()> {
    let config = util::load_config(config_path)?;
    if config.targets.is_empty() {
        anyhow::bail!(
            "No watch targets configured in {} (see 'nudge config example')",
            config_path.display()
        );
    }

    let state_dir = util::state_dir()?;
    let lock = DaemonLock::acquire(&state_dir)?;
    info!(
        "Daemon started (pid {}, config {})",
        std::process::id(),
        config_path.display()
    );

    let targets = resolve_targets(&config)?;

    // Any target that cannot be watched aborts startup
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut watchers: HashMap<WatchTargetId, TargetWatcher> = HashMap::new();
    for target in &targets {
        let rules = IgnoreRules::load(&target.root, target.ignore.clone())
            .with_context(|| format!("Failed to load ignore rules for target '{}'", target.id))?;
        let watcher = TargetWatcher::watch(target, rules, events_tx.clone())
            .with_context(|| format!("Failed to start watcher for target '{}'", target.id))?;
        watchers.insert(target.id.clone(), watcher);
    }
    drop(events_tx);

    let reader: Arc<dyn FileReader> = Arc::new(FsReader);
    let invoker = AgentInvoker::new(
        Arc::new(CommandAgentRuntime::from_config(&config)),
        reader.clone(),
        Duration::from_secs(config.agent_timeout_secs),
    );
    let pipeline = Arc::new(DirectivePipeline::new(targets.iter().cloned(), reader, invoker));
    let queue = DispatchQueue::start(config.concurrency, pipeline);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    let driver = DebounceDriver::new(
        DebounceTracker::with_targets(&targets),
        events_rx,
        queue.clone(),
        shutdown_rx,
    )
    .with_failures(failures_tx);
    let driver = tokio::spawn(driver.run());

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            result = &mut signal => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signals: {}", e);
                }
                break;
            }
            Some(failure) = failures_rx.recv() => {
                // The target is done; the others keep running
                if let Some(watcher) = watchers.remove(&failure.target) {
                    watcher.close();
                }
                error!("{}; {} target(s) still watched", failure, watchers.len());
                if watchers.is_empty() {
                    warn!("No targets left to watch");
                    break;
                }
            }
        }
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    for (_, watcher) in watchers.drain() {
        watcher.close();
    }

    if let Err(e) = driver.await {
        error!("Debounce driver failed: {}", e);
    }

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if !queue.shutdown(grace).await {
        warn!("Exiting with agent sessions still running");
    }

    let stats = queue.stats();
    info!(
        "Daemon stopped ({} tasks completed, {} failed)",
        stats.completed, stats.failed
    );

    drop(lock);
    Ok(())
}

/// Canonical roots so event paths and ignore rules agree
fn resolve_targets(config: &NudgeConfig) -> Result<Vec<WatchTarget>> {
    WatchTarget::all_from(config)
        .into_iter()
        .map(|mut target| {
            target.root = target.root.canonicalize().with_context(|| {
                format!(
                    "Watch root {} for target '{}' is not accessible",
                    target.root.display(),
                    target.id
                )
            })?;
            Ok(target)
        })
        .collect()
}

/// Resolves on ctrl-c or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Lock content of the running daemon, if any
pub fn running() -> Result<Option<LockContent>> {
    Ok(locks::running_daemon(&util::state_dir()?))
}

/// Check if daemon is running
pub fn is_running() -> bool {
    matches!(running(), Ok(Some(_)))
}

/// Ask the running daemon to stop and wait for it to exit
pub async fn stop(wait: Duration) -> Result<bool> {
    let Some(daemon) = running()? else {
        return Ok(false);
    };

    send_terminate(daemon.pid)?;

    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if !locks::is_process_alive(daemon.pid) {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    anyhow::bail!(
        "Daemon (pid {}) did not exit within {:?}",
        daemon.pid,
        wait
    )
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).context("Invalid daemon pid")?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .with_context(|| format!("Failed to signal daemon (pid {})", pid))
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> Result<()> {
    anyhow::bail!("Stopping the daemon is only supported on unix")
}
