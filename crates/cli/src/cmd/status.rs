//! Show daemon status and configured targets

use crate::util;
use anyhow::Result;
use nudge_core::WatchTarget;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    let daemon = crate::daemon::running()?;
    let config = util::load_config(config_path);

    println!("{}", "Nudge Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    print!("Daemon:        ");
    match &daemon {
        Some(lock) => {
            println!("{}", "Running ✓".green());
            println!("  PID:         {}", lock.pid);
            println!(
                "  Started:     {}",
                util::format_relative_time(lock.started_at)
            );
        }
        None => {
            println!("{}", "Not running".yellow());
            println!("  {}", "Tip: Start with 'nudge start'".dimmed());
        }
    }
    println!();

    println!("Config:        {}", config_path.display().to_string().cyan());
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            println!("  {} {:#}", "Invalid:".red(), e);
            return Ok(());
        }
    };
    println!(
        "  Concurrency: {}   Agent timeout: {}s",
        config.concurrency, config.agent_timeout_secs
    );
    println!();

    println!("Targets:");
    let targets = WatchTarget::all_from(&config);
    if targets.is_empty() {
        println!("  {}", "None configured (see 'nudge config example')".dimmed());
    }
    for target in &targets {
        let root_state = if target.root.is_dir() {
            "".to_string()
        } else {
            " (missing)".red().to_string()
        };
        println!(
            "  {} {}{}",
            target.id.as_str().yellow(),
            target.root.display(),
            root_state
        );
        println!(
            "    agent {}, stable after {:?}, {}",
            target.agent_type.cyan(),
            target.stability_threshold,
            if target.polling {
                format!("polling every {:?}", target.poll_interval)
            } else {
                "native events".to_string()
            }
        );
    }

    Ok(())
}
