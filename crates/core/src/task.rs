//! Units of work handed from the debounce tracker to the dispatch queue

use crate::target::WatchTargetId;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::Instant;
use ulid::Ulid;

/// A stabilized path ready for scanning
#[derive(Debug, Clone)]
pub struct QueueTask {
    /// Correlates log lines for one task
    pub id: Ulid,
    pub target: WatchTargetId,
    pub path: PathBuf,
    pub enqueued_at: Instant,
}

impl QueueTask {
    pub fn new(target: WatchTargetId, path: PathBuf, enqueued_at: Instant) -> Self {
        Self {
            id: Ulid::new(),
            target,
            path,
            enqueued_at,
        }
    }
}

/// Anything that accepts stabilized tasks
///
/// Returns false once the sink no longer accepts work (shutdown).
pub trait TaskSink: Send {
    fn submit(&self, task: QueueTask) -> bool;
}

impl TaskSink for mpsc::UnboundedSender<QueueTask> {
    fn submit(&self, task: QueueTask) -> bool {
        self.send(task).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_rejects_after_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = QueueTask::new(WatchTargetId::new("app"), PathBuf::from("a.py"), Instant::now());

        assert!(tx.submit(task.clone()));
        assert_eq!(rx.recv().await.unwrap().id, task.id);

        rx.close();
        assert!(!tx.submit(task));
    }

    #[test]
    fn test_task_ids_are_unique() {
        let now = Instant::now();
        let a = QueueTask::new(WatchTargetId::new("app"), PathBuf::from("a.py"), now);
        let b = QueueTask::new(WatchTargetId::new("app"), PathBuf::from("a.py"), now);
        assert_ne!(a.id, b.id);
    }
}
