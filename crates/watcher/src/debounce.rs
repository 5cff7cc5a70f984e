//! Per-path debouncing logic
//!
//! Collapses a burst of add/change events on one path into a single queue
//! task, emitted once the path has been quiet for the target's stability
//! threshold. Each `(target, path)` pair is in one of three states:
//!
//! - `Idle`: no entry
//! - `Pending(expires_at)`: exactly one entry with one deadline
//! - `Queued`: the deadline passed, the entry was removed and a `QueueTask`
//!   handed to the sink
//!
//! A new add/change after `Queued` opens a fresh `Pending` window; the earlier
//! task proceeds independently.
//!
//! `DebounceTracker` is a pure state machine driven with explicit instants.
//! `DebounceDriver` runs it against the live event stream.

use crate::{WatchEvent, WatchEventKind};
use nudge_core::{QueueTask, TaskSink, WatchError, WatchTarget, WatchTargetId};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

type PendingKey = (WatchTargetId, PathBuf);

/// Observable state of one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Idle,
    Pending { expires_at: Instant },
}

/// What an event did to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceOutcome {
    /// A deadline was set; `replaced` when an earlier one was cancelled
    Scheduled { expires_at: Instant, replaced: bool },
    /// An unlink cancelled a pending change
    Cancelled,
    /// Nothing changed (unknown target, unlink of an idle path, error)
    Unchanged,
}

/// Counters for log summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceStats {
    pub events_received: u64,
    /// add/change events that reset an existing deadline
    pub events_coalesced: u64,
    pub cancelled_by_unlink: u64,
    pub tasks_emitted: u64,
}

/// Per-path debounce state machine
#[derive(Debug, Default)]
pub struct DebounceTracker {
    thresholds: HashMap<WatchTargetId, Duration>,
    pending: HashMap<PendingKey, Instant>,
    stats: DebounceStats,
}

impl DebounceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets<'a>(targets: impl IntoIterator<Item = &'a WatchTarget>) -> Self {
        let mut tracker = Self::new();
        for target in targets {
            tracker.register(target);
        }
        tracker
    }

    /// Register a target's stability threshold
    pub fn register(&mut self, target: &WatchTarget) {
        self.thresholds
            .insert(target.id.clone(), target.stability_threshold);
    }

    /// Apply one watcher event at instant `now`
    pub fn on_event(&mut self, event: &WatchEvent, now: Instant) -> DebounceOutcome {
        self.stats.events_received += 1;

        match event.kind {
            WatchEventKind::Add | WatchEventKind::Change => {
                let Some(threshold) = self.thresholds.get(&event.target) else {
                    return DebounceOutcome::Unchanged;
                };

                let expires_at = now + *threshold;
                let key = (event.target.clone(), event.path.clone());
                // Insert replaces, so there is never more than one deadline per key
                let replaced = self.pending.insert(key, expires_at).is_some();
                if replaced {
                    self.stats.events_coalesced += 1;
                }

                DebounceOutcome::Scheduled {
                    expires_at,
                    replaced,
                }
            }
            WatchEventKind::Unlink => {
                let key = (event.target.clone(), event.path.clone());
                if self.pending.remove(&key).is_some() {
                    self.stats.cancelled_by_unlink += 1;
                    DebounceOutcome::Cancelled
                } else {
                    DebounceOutcome::Unchanged
                }
            }
            WatchEventKind::Error(_) => DebounceOutcome::Unchanged,
        }
    }

    /// Promote every pending change whose deadline is at or before `now`
    ///
    /// Tasks come out oldest deadline first.
    pub fn expire(&mut self, now: Instant) -> Vec<QueueTask> {
        let mut ready: Vec<(PendingKey, Instant)> = self
            .pending
            .iter()
            .filter(|(_, expires_at)| **expires_at <= now)
            .map(|(key, expires_at)| (key.clone(), *expires_at))
            .collect();

        ready.sort_by(|(left_key, left), (right_key, right)| {
            left.cmp(right).then_with(|| left_key.cmp(right_key))
        });

        ready
            .into_iter()
            .map(|(key, _)| {
                self.pending.remove(&key);
                self.stats.tasks_emitted += 1;
                let (target, path) = key;
                QueueTask::new(target, path, now)
            })
            .collect()
    }

    /// Earliest outstanding deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub fn state(&self, target: &WatchTargetId, path: &Path) -> PathState {
        match self.pending.get(&(target.clone(), path.to_path_buf())) {
            Some(expires_at) => PathState::Pending {
                expires_at: *expires_at,
            },
            None => PathState::Idle,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending change; returns how many were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    pub fn stats(&self) -> DebounceStats {
        self.stats
    }
}

/// Runs a tracker against the live event stream
///
/// Single consumer of all targets' events. Stops on shutdown, when every
/// event sender is gone, or when the sink stops accepting tasks.
pub struct DebounceDriver<S: TaskSink> {
    tracker: DebounceTracker,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    sink: S,
    shutdown: watch::Receiver<bool>,
    failures: Option<mpsc::UnboundedSender<WatchError>>,
    failed: HashSet<WatchTargetId>,
}

impl<S: TaskSink> DebounceDriver<S> {
    pub fn new(
        tracker: DebounceTracker,
        events: mpsc::UnboundedReceiver<WatchEvent>,
        sink: S,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tracker,
            events,
            sink,
            shutdown,
            failures: None,
            failed: HashSet::new(),
        }
    }

    /// Report watcher failures on this channel
    pub fn with_failures(mut self, failures: mpsc::UnboundedSender<WatchError>) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Run until shutdown; returns final counters
    pub async fn run(mut self) -> DebounceStats {
        info!("Debounce driver started");

        loop {
            let deadline = self.tracker.next_deadline();

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        debug!("All watchers closed");
                        break;
                    }
                },

                _ = sleep_until_deadline(deadline) => {
                    if !self.flush(Instant::now()) {
                        warn!("Dispatch queue closed; no further tasks will be created");
                        break;
                    }
                }
            }
        }

        let discarded = self.tracker.clear();
        if discarded > 0 {
            info!("Discarded {} pending changes on shutdown", discarded);
        }

        let stats = self.tracker.stats();
        info!(
            "Debounce driver stopped ({} events, {} coalesced, {} cancelled, {} tasks)",
            stats.events_received,
            stats.events_coalesced,
            stats.cancelled_by_unlink,
            stats.tasks_emitted
        );
        stats
    }

    fn handle(&mut self, event: WatchEvent) {
        if self.failed.contains(&event.target) {
            return;
        }

        if let WatchEventKind::Error(message) = &event.kind {
            error!("Watcher for target '{}' failed: {}", event.target, message);
            self.failed.insert(event.target.clone());
            if let Some(failures) = &self.failures {
                let _ = failures.send(WatchError {
                    target: event.target.clone(),
                    message: message.clone(),
                });
            }
            return;
        }

        match self.tracker.on_event(&event, Instant::now()) {
            DebounceOutcome::Scheduled { replaced, .. } => debug!(
                "{:?} {} ({})",
                event.kind,
                event.path.display(),
                if replaced { "timer reset" } else { "timer started" }
            ),
            DebounceOutcome::Cancelled => {
                debug!("Unlink {} cancelled pending change", event.path.display())
            }
            DebounceOutcome::Unchanged => {}
        }
    }

    /// Hand expired changes to the sink; false once the sink refuses work
    fn flush(&mut self, now: Instant) -> bool {
        for task in self.tracker.expire(now) {
            debug!(
                "Stable: {} (target '{}', task {})",
                task.path.display(),
                task.target,
                task.id
            );
            if !self.sink.submit(task) {
                return false;
            }
        }
        true
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
