//! Stop the nudge daemon

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Duration;

/// Time allowed on top of the configured shutdown grace period
const STOP_MARGIN: Duration = Duration::from_secs(5);

pub async fn run(config_path: &Path) -> Result<()> {
    let grace = util::load_config(config_path)
        .map(|config| Duration::from_secs(config.shutdown_grace_secs))
        .unwrap_or_default();

    if crate::daemon::stop(grace + STOP_MARGIN).await? {
        println!("{}", "Daemon stopped".green());
    } else {
        println!("{}", "Daemon is not running".yellow());
    }
    Ok(())
}
