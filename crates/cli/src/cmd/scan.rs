//! Dry-run scan for directive comments
//!
//! Walks the given paths with the same ignore rules the daemon uses and
//! prints every directive found. No agent is started.

use crate::util;
use anyhow::{Context, Result};
use nudge_core::{scan, IgnoreConfig, NudgeConfig, Trigger, WatchTarget};
use nudge_watcher::IgnoreRules;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub async fn run(config_path: &Path, paths: &[PathBuf], json: bool) -> Result<()> {
    let config = util::load_config(config_path)?;

    let mut triggers = Vec::new();
    let mut files_scanned = 0usize;

    for path in paths {
        let path = path
            .canonicalize()
            .with_context(|| format!("Cannot access {}", path.display()))?;

        for file in collect_files(&path, &config)? {
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            files_scanned += 1;
            triggers.extend(scan(&file, &content));
        }
    }

    if json {
        for trigger in &triggers {
            println!("{}", serde_json::to_string(trigger)?);
        }
        return Ok(());
    }

    let cwd = std::env::current_dir().ok();
    for trigger in &triggers {
        util::display_trigger(trigger, cwd.as_deref());
    }
    print_summary(&triggers, files_scanned);
    Ok(())
}

/// Files under `path`, honouring the ignore rules of the enclosing target
fn collect_files(path: &Path, config: &NudgeConfig) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let (root, ignore) = enclosing_target(path, config)
        .map(|target| (target.root, target.ignore))
        .unwrap_or_else(|| (path.to_path_buf(), IgnoreConfig::default()));

    let rules = IgnoreRules::load(&root, ignore)
        .with_context(|| format!("Failed to load ignore rules for {}", root.display()))?;

    let files = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !rules.should_ignore(entry.path()))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    Ok(files)
}

/// Configured target whose root contains `path`, deepest root first
fn enclosing_target(path: &Path, config: &NudgeConfig) -> Option<WatchTarget> {
    WatchTarget::all_from(config)
        .into_iter()
        .filter_map(|mut target| {
            target.root = target.root.canonicalize().ok()?;
            path.starts_with(&target.root).then_some(target)
        })
        .max_by_key(|target| target.root.components().count())
}

fn print_summary(triggers: &[Trigger], files_scanned: usize) {
    let actionable = triggers.iter().filter(|t| t.kind.is_actionable()).count();
    println!();
    println!(
        "{} directive(s) in {} file(s), {} actionable",
        triggers.len().to_string().bold(),
        files_scanned,
        actionable.to_string().green()
    );
}
