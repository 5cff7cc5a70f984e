//! notify-backed watch adapter
//!
//! One `TargetWatcher` per target. Raw notify events are translated into
//! add/change/unlink/error, filtered through the target's ignore rules and
//! pushed onto an unbounded channel consumed by the debounce driver.

use crate::filter::IgnoreRules;
use crate::{WatchEvent, WatchEventKind};
use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventHandler, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use nudge_core::{WatchError, WatchTarget, WatchTargetId};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A running watcher for one target
pub struct TargetWatcher {
    target: WatchTargetId,
    root: PathBuf,
    watcher: Box<dyn Watcher + Send>,
}

impl TargetWatcher {
    /// Start watching `target.root` recursively
    ///
    /// Fails if the root is missing or the OS watcher cannot be set up; the
    /// caller treats that as a fatal setup error.
    pub fn watch(
        target: &WatchTarget,
        rules: IgnoreRules,
        events: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<Self, WatchError> {
        let fail = |message: String| WatchError {
            target: target.id.clone(),
            message,
        };

        if !target.root.is_dir() {
            return Err(fail(format!(
                "root {} is not a directory",
                target.root.display()
            )));
        }

        let forwarder = EventForwarder {
            target: target.id.clone(),
            root: target.root.clone(),
            rules,
            events,
        };
        let config = Config::default().with_poll_interval(target.poll_interval);

        let mut watcher: Box<dyn Watcher + Send> = if target.polling {
            Box::new(PollWatcher::new(forwarder, config).map_err(|e| fail(e.to_string()))?)
        } else {
            Box::new(RecommendedWatcher::new(forwarder, config).map_err(|e| fail(e.to_string()))?)
        };

        watcher
            .watch(&target.root, RecursiveMode::Recursive)
            .map_err(|e| fail(e.to_string()))?;

        info!(
            "Watching {} for target '{}' ({})",
            target.root.display(),
            target.id,
            if target.polling {
                format!("polling every {:?}", target.poll_interval)
            } else {
                "native events".to_string()
            }
        );

        Ok(Self {
            target: target.id.clone(),
            root: target.root.clone(),
            watcher,
        })
    }

    pub fn target(&self) -> &WatchTargetId {
        &self.target
    }

    /// Stop watching; no further events are produced for this target
    pub fn close(self) {
        drop(self.watcher);
        info!(
            "Stopped watching {} for target '{}'",
            self.root.display(),
            self.target
        );
    }
}

/// notify callback that filters and forwards events
struct EventForwarder {
    target: WatchTargetId,
    root: PathBuf,
    rules: IgnoreRules,
    events: mpsc::UnboundedSender<WatchEvent>,
}

impl EventForwarder {
    fn forward(&self, kind: WatchEventKind, path: PathBuf) {
        if self
            .events
            .send(WatchEvent::new(self.target.clone(), path, kind))
            .is_err()
        {
            debug!("Event receiver for target '{}' is gone", self.target);
        }
    }
}

impl EventHandler for EventForwarder {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        match event {
            Ok(event) => {
                for (kind, path) in translate(&event) {
                    if self.rules.should_ignore(&path) {
                        continue;
                    }
                    // Only files carry directives
                    if kind != WatchEventKind::Unlink && path.is_dir() {
                        continue;
                    }
                    self.forward(kind, path);
                }
            }
            Err(err) => {
                let path = err.paths.first().cloned().unwrap_or_else(|| self.root.clone());
                self.forward(WatchEventKind::Error(err.to_string()), path);
            }
        }
    }
}

/// Map a notify event onto add/change/unlink per path
pub(crate) fn translate(event: &Event) -> Vec<(WatchEventKind, PathBuf)> {
    let paths = event.paths.as_slice();

    match &event.kind {
        EventKind::Create(_) => each(paths, WatchEventKind::Add),
        EventKind::Remove(_) => each(paths, WatchEventKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            each(paths, WatchEventKind::Unlink)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(paths, WatchEventKind::Add),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths {
            [from, to] => vec![
                (WatchEventKind::Unlink, from.clone()),
                (WatchEventKind::Add, to.clone()),
            ],
            _ => by_existence(paths, WatchEventKind::Add),
        },
        EventKind::Modify(ModifyKind::Name(_)) => by_existence(paths, WatchEventKind::Add),
        // Pollers report content changes as write-time updates
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime | MetadataKind::Any)) => {
            each(paths, WatchEventKind::Change)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => each(paths, WatchEventKind::Change),
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => by_existence(paths, WatchEventKind::Change),
    }
}

fn each(paths: &[PathBuf], kind: WatchEventKind) -> Vec<(WatchEventKind, PathBuf)> {
    paths.iter().map(|path| (kind.clone(), path.clone())).collect()
}

/// Ambiguous events: present paths get `present`, missing ones unlink
fn by_existence(paths: &[PathBuf], present: WatchEventKind) -> Vec<(WatchEventKind, PathBuf)> {
    paths
        .iter()
        .map(|path| {
            let kind = if Path::new(path).exists() {
                present.clone()
            } else {
                WatchEventKind::Unlink
            };
            (kind, path.clone())
        })
        .collect()
}
