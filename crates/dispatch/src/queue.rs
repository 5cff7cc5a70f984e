//! Bounded-concurrency dispatch queue
//!
//! Producers push without ever blocking. A single dispatcher task pulls tasks
//! in FIFO order and starts each one only after it holds a semaphore permit,
//! so at most `concurrency` tasks run at once. A task's failure or panic is
//! logged against that task and the dispatcher moves on.

use async_trait::async_trait;
use nudge_core::{QueueTask, TaskError, TaskSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What a finished task did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Directives found in the file, of any kind
    pub triggers: usize,
    pub sessions_completed: usize,
    /// Modify directives that needed no session
    pub skipped: usize,
}

/// Work performed for each dequeued task
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    async fn process(&self, task: &QueueTask) -> Result<TaskOutcome, TaskError>;
}

/// The queue no longer accepts tasks
#[derive(Debug, Error)]
#[error("dispatch queue is closed")]
pub struct QueueClosed;

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub concurrency: usize,
    /// Pushed but not yet started
    pub queued: usize,
    pub active: usize,
    pub peak_active: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Holds one slot of the active count for the lifetime of a task
struct ActiveSlot(Arc<Counters>);

impl ActiveSlot {
    fn enter(counters: &Arc<Counters>) -> Self {
        let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_active.fetch_max(now, Ordering::SeqCst);
        Self(counters.clone())
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        // Runs during unwinding too, so a panicking task frees its slot
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Shared {
    tx: mpsc::UnboundedSender<QueueTask>,
    closed: watch::Sender<bool>,
    counters: Arc<Counters>,
    concurrency: usize,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Entry point for starting a queue
pub struct DispatchQueue;

impl DispatchQueue {
    /// Spawn the dispatcher on the current runtime
    ///
    /// `concurrency` is clamped to at least 1.
    pub fn start<P: TaskProcessor>(concurrency: usize, processor: Arc<P>) -> QueueHandle {
        let concurrency = concurrency.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let dispatcher = tokio::spawn(dispatch_loop(
            rx,
            closed_rx,
            Arc::new(Semaphore::new(concurrency)),
            processor,
            counters.clone(),
        ));

        info!("Dispatch queue started (concurrency {})", concurrency);

        QueueHandle {
            shared: Arc::new(Shared {
                tx,
                closed: closed_tx,
                counters,
                concurrency,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }
}

/// Cloneable handle for pushing tasks and shutting the queue down
#[derive(Clone)]
pub struct QueueHandle {
    shared: Arc<Shared>,
}

impl QueueHandle {
    /// Append a task; never waits for capacity
    pub fn push(&self, task: QueueTask) -> Result<(), QueueClosed> {
        if *self.shared.closed.borrow() {
            return Err(QueueClosed);
        }
        let counters = &self.shared.counters;
        counters.queued.fetch_add(1, Ordering::SeqCst);
        self.shared.tx.send(task).map_err(|_| {
            counters.queued.fetch_sub(1, Ordering::SeqCst);
            QueueClosed
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Stop accepting tasks; tasks not yet started are dropped
    pub fn close(&self) {
        self.shared.closed.send_replace(true);
    }

    pub fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;
        QueueStats {
            concurrency: self.shared.concurrency,
            queued: counters.queued.load(Ordering::SeqCst),
            active: counters.active.load(Ordering::SeqCst),
            peak_active: counters.peak_active.load(Ordering::SeqCst),
            completed: counters.completed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Close the queue and wait up to `grace` for running tasks
    ///
    /// Returns false if tasks were still running when the grace period ran
    /// out. Those tasks are not cancelled.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.close();
        let Some(dispatcher) = self.shared.dispatcher.lock().take() else {
            return true;
        };

        match tokio::time::timeout(grace, dispatcher).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Dispatcher task failed: {}", e);
                true
            }
            Err(_) => {
                warn!(
                    "{} task(s) still running after {:?} grace period",
                    self.stats().active,
                    grace
                );
                false
            }
        }
    }
}

impl TaskSink for QueueHandle {
    fn submit(&self, task: QueueTask) -> bool {
        self.push(task).is_ok()
    }
}

/// Resolves once the queue is closed or every handle is gone
async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn dispatch_loop<P: TaskProcessor>(
    mut rx: mpsc::UnboundedReceiver<QueueTask>,
    mut closed: watch::Receiver<bool>,
    semaphore: Arc<Semaphore>,
    processor: Arc<P>,
    counters: Arc<Counters>,
) {
    let mut workers = JoinSet::new();

    loop {
        let permit = tokio::select! {
            biased;
            _ = closed_signal(&mut closed) => break,
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                report_join(joined, &counters);
                continue;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let task = tokio::select! {
            biased;
            _ = closed_signal(&mut closed) => break,
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                report_join(joined, &counters);
                continue;
            }
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        let processor = processor.clone();
        let counters = counters.clone();
        workers.spawn(async move {
            let _permit = permit;
            let _slot = ActiveSlot::enter(&counters);
            run_task(processor.as_ref(), &task, &counters).await;
        });
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    counters.queued.store(0, Ordering::SeqCst);
    if dropped > 0 {
        warn!("Dispatch queue closed with {} task(s) not started", dropped);
    }

    while let Some(joined) = workers.join_next().await {
        report_join(joined, &counters);
    }
    debug!("Dispatcher stopped");
}

async fn run_task<P: TaskProcessor>(processor: &P, task: &QueueTask, counters: &Counters) {
    let started = Instant::now();
    debug!(
        "Task {} started for {} after {:?} in queue",
        task.id,
        task.path.display(),
        started.duration_since(task.enqueued_at)
    );

    match processor.process(task).await {
        Ok(outcome) => {
            counters.completed.fetch_add(1, Ordering::SeqCst);
            if outcome.triggers > 0 {
                info!(
                    "Task {} done for {}: {} directive(s), {} session(s) completed, {} skipped ({:?})",
                    task.id,
                    task.path.display(),
                    outcome.triggers,
                    outcome.sessions_completed,
                    outcome.skipped,
                    started.elapsed()
                );
            } else {
                debug!("Task {} done for {}: no directives", task.id, task.path.display());
            }
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            match err {
                TaskError::Read { .. } | TaskError::Timeout { .. } => {
                    warn!("Task {} for {}: {}", task.id, task.path.display(), err)
                }
                _ => error!("Task {} for {} failed: {}", task.id, task.path.display(), err),
            }
        }
    }
}

fn report_join(joined: Result<(), JoinError>, counters: &Counters) {
    if let Err(e) = joined {
        counters.failed.fetch_add(1, Ordering::SeqCst);
        if e.is_panic() {
            error!("Task panicked: {}", e);
        } else {
            warn!("Task aborted: {}", e);
        }
    }
}
