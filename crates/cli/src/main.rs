//! Nudge CLI - nudge command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

mod cmd;
mod daemon;
mod locks;
mod util;

/// Nudge - act on AI! comments as you save
#[derive(Parser)]
#[command(name = "nudge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "NUDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Run in foreground (for debugging)
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the daemon
    Stop,
    /// Show daemon status and configured targets
    Status,
    /// List directive comments without invoking any agent
    Scan {
        /// Files or directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print triggers as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    List,
    /// Print the config file path
    Path {
        /// Write the example config if the file does not exist
        #[arg(long)]
        create: bool,
    },
    /// Print an example configuration
    Example,
}

/// Install the global subscriber
///
/// Logs go to stderr; with a `log_dir` they are also written to a daily
/// rolling file. The returned guard must live as long as logging is needed.
fn init_tracing(default_filter: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "nudge.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = util::config_path(cli.config.as_deref())?;

    let _log_guard = match &cli.command {
        Commands::Start { foreground: true } => {
            let log_dir = util::load_config(&config_path)
                .ok()
                .and_then(|config| config.log_dir);
            init_tracing("info", log_dir.as_deref())?
        }
        _ => init_tracing("warn", None)?,
    };

    match cli.command {
        Commands::Start { foreground } => cmd::start::run(&config_path, foreground).await,
        Commands::Stop => cmd::stop::run(&config_path).await,
        Commands::Status => cmd::status::run(&config_path).await,
        Commands::Scan { paths, json } => cmd::scan::run(&config_path, &paths, json).await,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list(&config_path).await,
            ConfigCommands::Path { create } => cmd::config::run_path(&config_path, create).await,
            ConfigCommands::Example => cmd::config::run_example().await,
        },
    }
}
