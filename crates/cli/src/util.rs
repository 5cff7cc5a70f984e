//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use nudge_core::{config, DirectiveKind, NudgeConfig, Trigger};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

/// Resolve the config file: explicit path first, then the platform default
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config::config_file_path().context("Could not determine config file path"),
    }
}

/// Load and validate configuration, falling back to defaults if absent
pub fn load_config(path: &Path) -> Result<NudgeConfig> {
    config::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Directory holding the daemon lock and background logs
pub fn state_dir() -> Result<PathBuf> {
    config::state_dir().context("Could not determine state directory")
}

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts_ms: u64) -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let datetime = UNIX_EPOCH + Duration::from_millis(ts_ms);

    match SystemTime::now().duration_since(datetime) {
        Ok(elapsed) => {
            let seconds = elapsed.as_secs();
            if seconds < 60 {
                format!("{} seconds ago", seconds)
            } else if seconds < 3600 {
                format!("{} minutes ago", seconds / 60)
            } else if seconds < 86400 {
                format!("{} hours ago", seconds / 3600)
            } else {
                format!("{} days ago", seconds / 86400)
            }
        }
        Err(_) => "in the future".to_string(),
    }
}

/// Display a trigger as `path:line kind text`
pub fn display_trigger(trigger: &Trigger, relative_to: Option<&Path>) {
    let path = relative_to
        .and_then(|base| trigger.file_path.strip_prefix(base).ok())
        .unwrap_or(&trigger.file_path);
    let location = format!("{}:{}", path.display(), trigger.line_number);

    let kind = match trigger.kind {
        DirectiveKind::Modify => "modify".green().bold().to_string(),
        DirectiveKind::Question => "question".yellow().to_string(),
        DirectiveKind::Note => "note".dimmed().to_string(),
    };

    println!("{} {} {}", location.cyan(), kind, trigger.instruction_text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_path_wins() {
        let path = config_path(Some(Path::new("/tmp/nudge.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/nudge.toml"));
    }

    #[test]
    fn test_missing_config_loads_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("absent.toml")).unwrap();
        assert!(config.targets.is_empty());
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_format_relative_time() {
        use std::time::{SystemTime, UNIX_EPOCH};

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        assert!(format_relative_time(now_ms).contains("seconds ago"));
        assert!(format_relative_time(now_ms - 3600 * 1000).contains("hour"));
        assert!(format_relative_time(now_ms - 86400 * 1000).contains("day"));
        assert_eq!(format_relative_time(now_ms + 3_600_000), "in the future");
    }
}
