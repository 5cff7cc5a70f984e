//! Start the nudge daemon

use crate::util;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

pub async fn run(config_path: &Path, foreground: bool) -> Result<()> {
    if foreground {
        crate::daemon::run(config_path).await
    } else {
        start_background(config_path).await
    }
}

async fn start_background(config_path: &Path) -> Result<()> {
    use std::process::Command;

    if let Some(daemon) = crate::daemon::running()? {
        anyhow::bail!("Daemon already running (pid {})", daemon.pid);
    }

    // Fail here rather than in a detached process nobody is watching
    let config = util::load_config(config_path)?;
    if config.targets.is_empty() {
        anyhow::bail!(
            "No watch targets configured in {} (see 'nudge config example')",
            config_path.display()
        );
    }

    let logs_dir = util::state_dir()?.join("logs");
    std::fs::create_dir_all(&logs_dir).context("Failed to create logs directory")?;
    let log_file = logs_dir.join("daemon.log");

    let exe = std::env::current_exe().context("Failed to get current executable path")?;

    let log_file_writer = std::fs::File::create(&log_file).context("Failed to create log file")?;

    Command::new("nohup")
        .arg(&exe)
        .arg("--config")
        .arg(config_path)
        .arg("start")
        .arg("--foreground")
        .stdout(log_file_writer.try_clone()?)
        .stderr(log_file_writer)
        .spawn()
        .context("Failed to spawn daemon process")?;

    // Wait a moment to verify it started
    tokio::time::sleep(Duration::from_millis(500)).await;

    if crate::daemon::is_running() {
        println!("Daemon started successfully");
        println!("Logs: {}", log_file.display());
        Ok(())
    } else {
        anyhow::bail!(
            "Daemon failed to start (check logs at {})",
            log_file.display()
        );
    }
}
