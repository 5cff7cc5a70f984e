//! Configuration management command
//!
//! Provides CLI interface to view the configuration.

use crate::util;
use anyhow::Result;
use nudge_core::config;
use owo_colors::OwoColorize;
use std::path::Path;

/// List the effective configuration
pub async fn run_list(config_path: &Path) -> Result<()> {
    let config = util::load_config(config_path)?;

    println!("{}", "Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());

    println!("  {} = {}", "concurrency".cyan(), config.concurrency);
    println!(
        "  {} = {} {}",
        "agent_timeout_secs".cyan(),
        config.agent_timeout_secs,
        format!("({} min)", config.agent_timeout_secs / 60).dimmed()
    );
    println!(
        "  {} = {}",
        "shutdown_grace_secs".cyan(),
        config.shutdown_grace_secs
    );
    match &config.log_dir {
        Some(dir) => println!("  {} = {}", "log_dir".cyan(), dir.display()),
        None => println!("  {} = {}", "log_dir".cyan(), "(stderr only)".dimmed()),
    }

    for (name, target) in &config.targets {
        println!("\n{}", format!("[targets.{}]", name).yellow());
        println!("  {} = {}", "root".cyan(), target.root.display());
        println!("  {} = {}", "poll_interval_ms".cyan(), target.poll_interval_ms);
        println!(
            "  {} = {}",
            "stability_threshold_ms".cyan(),
            target.stability_threshold_ms
        );
        println!("  {} = {}", "agent_type".cyan(), target.agent_type);
        println!("  {} = {}", "polling".cyan(), target.polling);
        println!(
            "  {} = {} / {} / {:?}",
            "ignore".cyan(),
            if target.ignore.use_gitignore { "gitignore" } else { "no gitignore" },
            if target.ignore.use_nudgeignore { "nudgeignore" } else { "no nudgeignore" },
            target.ignore.additional_patterns
        );
    }

    for (name, agent) in &config.agents {
        println!("\n{}", format!("[agents.{}]", name).yellow());
        println!("  {} = {}", "command".cyan(), agent.command);
        println!("  {} = {:?}", "args".cyan(), agent.args);
        println!("  {} = {}", "stdin".cyan(), agent.stdin);
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  concurrency: 1-64");
    println!("  agent_timeout_secs: 1-86400");
    println!("  shutdown_grace_secs: 0-3600");
    println!("  poll_interval_ms: 10-60000");
    println!("  stability_threshold_ms: 0-600000");

    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(config_path: &Path, create: bool) -> Result<()> {
    if create && !config_path.exists() {
        config::init_if_missing(config_path)?;
        println!(
            "{} Created config file at: {}",
            "✓".green(),
            config_path.display()
        );
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", config::example_config());
    Ok(())
}
