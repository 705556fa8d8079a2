//! Bounded task queue.
//!
//! `enqueue_task` appends to a fixed-capacity FIFO buffer and waits while the
//! buffer is full, so submitters are slowed down instead of dropped. The
//! worker pool drains the buffer with at most `max_concurrent_tasks` handlers
//! running at once.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::registry::HandlerRegistry;
use super::worker_pool::{Dispatcher, SharedReceiver, WorkerPool, WorkerPoolConfig};
use crate::database::repositories::TaskRepository;
use crate::domain::{Task, TaskStatus};
use crate::{Error, Result};

/// Live counters shared between the queue and its workers.
#[derive(Debug, Default)]
pub struct QueueCounters {
    pub(crate) queued: AtomicUsize,
    pub(crate) running: AtomicUsize,
    pub(crate) max_observed_running: AtomicUsize,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) skipped: AtomicU64,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tasks sitting in the buffer.
    pub queued: usize,
    /// Handlers currently executing.
    pub running: usize,
    pub max_observed_running: usize,
    pub completed: u64,
    pub failed: u64,
    /// Tasks dropped at dispatch because they were no longer queueable.
    pub skipped: u64,
}

/// Configuration for the task queue.
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub buffer_size: usize,
    pub max_concurrent_tasks: usize,
    /// Removed from task messages before they are stored.
    pub redact_root: Option<PathBuf>,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            max_concurrent_tasks: 4,
            redact_root: None,
        }
    }
}

/// Bounded FIFO of tasks feeding a worker pool.
pub struct TaskQueue {
    config: TaskQueueConfig,
    store: Arc<dyn TaskRepository>,
    registry: Arc<HandlerRegistry>,
    sender: parking_lot::RwLock<Option<mpsc::Sender<Task>>>,
    receiver: SharedReceiver,
    counters: Arc<QueueCounters>,
    pool: WorkerPool,
}

impl TaskQueue {
    pub fn new(
        config: TaskQueueConfig,
        store: Arc<dyn TaskRepository>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let buffer_size = config.buffer_size.max(1);
        let (sender, receiver) = mpsc::channel(buffer_size);
        let pool = WorkerPool::new(WorkerPoolConfig {
            max_workers: config.max_concurrent_tasks.max(1),
            redact_root: config.redact_root.clone(),
        });

        Self {
            config,
            store,
            registry,
            sender: parking_lot::RwLock::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            counters: Arc::new(QueueCounters::default()),
            pool,
        }
    }

    /// Start dispatching. Handlers should be registered before this point.
    pub fn start(&self) {
        if self.registry.is_empty() {
            warn!("Starting task queue with no registered handlers");
        }
        let dispatcher = Arc::new(Dispatcher {
            store: self.store.clone(),
            registry: self.registry.clone(),
            counters: self.counters.clone(),
            redact_root: self.config.redact_root.clone(),
        });
        self.pool.start(self.receiver.clone(), dispatcher);
        info!(
            buffer_size = self.config.buffer_size,
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            "Task queue started"
        );
    }

    /// Hand a task to the queue.
    ///
    /// A NEW task is moved to PENDING first; a task already PENDING (e.g.
    /// recovered after a restart) is buffered as is. Waits while the buffer is
    /// full. Returns the task as stored when it was buffered.
    pub async fn enqueue_task(&self, task: &Task) -> Result<Task> {
        let pending = match task.status {
            TaskStatus::New => {
                let pending = task.with_status(TaskStatus::Pending)?;
                self.store.update_task(&pending, TaskStatus::New).await?
            }
            TaskStatus::Pending => task.clone(),
            other => {
                return Err(Error::validation(format!(
                    "task {} is {} and cannot be enqueued",
                    task.id, other
                )));
            }
        };

        let sender = self.sender.read().clone();
        let Some(sender) = sender else {
            return Err(self.reject_closed(&pending).await);
        };

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if sender.send(pending.clone()).await.is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(self.reject_closed(&pending).await);
        }

        debug!(task_id = %pending.id, operation = %pending.operation, "Task enqueued");
        Ok(pending)
    }

    async fn reject_closed(&self, task: &Task) -> Error {
        let message = "task queue is shut down";
        if let Ok(mut failed) = task.with_status(TaskStatus::Error) {
            failed.err_msg = message.to_string();
            if let Err(e) = self.store.update_task(&failed, task.status).await {
                warn!(task_id = %task.id, error = %e, "Failed to record rejected task");
            }
        }
        Error::Other(format!("{message}; task {} not accepted", task.id))
    }

    /// Stop accepting tasks, run everything already buffered, then stop the
    /// workers.
    pub async fn shutdown(&self) {
        info!("Draining task queue");
        self.close_intake();
        self.pool.join().await;
        info!("Task queue drained");
    }

    /// Stop accepting tasks and stop the workers once their current handler
    /// returns. Buffered tasks stay PENDING in the store.
    pub async fn stop(&self) {
        self.close_intake();
        self.pool.stop().await;
    }

    fn close_intake(&self) {
        self.sender.write().take();
    }

    pub fn is_accepting(&self) -> bool {
        self.sender.read().is_some()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.counters.queued.load(Ordering::SeqCst),
            running: self.counters.running.load(Ordering::SeqCst),
            max_observed_running: self.counters.max_observed_running.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskOperation, TaskRequest};
    use crate::pipeline::handlers::{HandlerOutput, handler_fn};
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn queue_with(
        store: Arc<MemoryStore>,
        registry: Arc<HandlerRegistry>,
        buffer_size: usize,
        max_concurrent_tasks: usize,
    ) -> TaskQueue {
        TaskQueue::new(
            TaskQueueConfig {
                buffer_size,
                max_concurrent_tasks,
                redact_root: None,
            },
            store,
            registry,
        )
    }

    async fn new_task(store: &MemoryStore, op: TaskOperation) -> Task {
        store
            .create_task(&Task::new(TaskRequest::for_content(op, "c1")))
            .await
            .unwrap()
    }

    async fn wait_for_terminal(store: &MemoryStore, id: &str) -> Task {
        for _ in 0..500 {
            let task = store.get_task(id).await.unwrap();
            if task.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} never reached a terminal status");
    }

    #[tokio::test]
    async fn test_enqueue_moves_to_pending() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue_with(store.clone(), Arc::new(HandlerRegistry::new()), 4, 1);
        let task = new_task(&store, TaskOperation::ContentPreview).await;

        let pending = queue.enqueue_task(&task).await.unwrap();
        assert_eq!(pending.status, TaskStatus::Pending);
        assert_eq!(store.get_task(&task.id).await.unwrap().status, TaskStatus::Pending);
        assert_eq!(queue.stats().queued, 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_terminal_task() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue_with(store.clone(), Arc::new(HandlerRegistry::new()), 4, 1);
        let task = new_task(&store, TaskOperation::ContentPreview).await;
        let canceled = task.with_status(TaskStatus::Canceled).unwrap();
        store.update_task(&canceled, TaskStatus::New).await.unwrap();

        let err = queue.enqueue_task(&canceled).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_enqueue_blocks_when_full() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue_with(store.clone(), Arc::new(HandlerRegistry::new()), 1, 1);
        let first = new_task(&store, TaskOperation::ContentPreview).await;
        let second = new_task(&store, TaskOperation::ContentPreview).await;

        queue.enqueue_task(&first).await.unwrap();
        // Not started, so nothing drains the buffer.
        let blocked =
            tokio::time::timeout(Duration::from_millis(100), queue.enqueue_task(&second)).await;
        assert!(blocked.is_err(), "second enqueue should wait for space");
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails_task() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue_with(store.clone(), Arc::new(HandlerRegistry::new()), 4, 1);
        queue.start();
        queue.shutdown().await;
        assert!(!queue.is_accepting());

        let task = new_task(&store, TaskOperation::ContentPreview).await;
        assert!(queue.enqueue_task(&task).await.is_err());
        let stored = store.get_task(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Error);
        assert_eq!(stored.err_msg, "task queue is shut down");
    }

    #[tokio::test]
    async fn test_success_and_failure_outcomes() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(
            TaskOperation::ContentPreview,
            handler_fn("ok", |_| async {
                Ok(HandlerOutput::message("generated").with_created_id("new-content"))
            }),
        );
        registry.register(
            TaskOperation::Encoding,
            handler_fn("fail", |_| async {
                Err::<HandlerOutput, _>(Error::tool("ffmpeg", "exit code 1"))
            }),
        );
        let queue = queue_with(store.clone(), registry, 8, 2);
        queue.start();

        let ok = new_task(&store, TaskOperation::ContentPreview).await;
        let bad = new_task(&store, TaskOperation::Encoding).await;
        queue.enqueue_task(&ok).await.unwrap();
        queue.enqueue_task(&bad).await.unwrap();

        let ok = wait_for_terminal(&store, &ok.id).await;
        assert_eq!(ok.status, TaskStatus::Done);
        assert_eq!(ok.message, "generated");
        assert_eq!(ok.created_id.as_deref(), Some("new-content"));
        assert!(ok.started_at.is_some());

        let bad = wait_for_terminal(&store, &bad.id).await;
        assert_eq!(bad.status, TaskStatus::Error);
        assert_eq!(bad.err_msg, "ffmpeg failed: exit code 1");

        queue.shutdown().await;
        let stats = queue.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_unregistered_operation_errors() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue_with(store.clone(), Arc::new(HandlerRegistry::new()), 4, 1);
        queue.start();

        let task = new_task(&store, TaskOperation::WebpFromScreens).await;
        queue.enqueue_task(&task).await.unwrap();

        let task = wait_for_terminal(&store, &task.id).await;
        assert_eq!(task.status, TaskStatus::Error);
        assert!(!task.err_msg.is_empty());
        assert!(task.err_msg.contains("webp_from_screens"));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(
            TaskOperation::Encoding,
            handler_fn("explode", |task: Task| async move {
                if !task.id.is_empty() {
                    panic!("kaboom");
                }
                Ok(HandlerOutput::default())
            }),
        );
        registry.register(
            TaskOperation::ContentPreview,
            handler_fn("ok", |_| async { Ok(HandlerOutput::default()) }),
        );
        let queue = queue_with(store.clone(), registry, 4, 1);
        queue.start();

        let bad = new_task(&store, TaskOperation::Encoding).await;
        let good = new_task(&store, TaskOperation::ContentPreview).await;
        queue.enqueue_task(&bad).await.unwrap();
        queue.enqueue_task(&good).await.unwrap();

        let bad = wait_for_terminal(&store, &bad.id).await;
        assert_eq!(bad.status, TaskStatus::Error);
        assert!(bad.err_msg.contains("kaboom"));
        assert_eq!(
            wait_for_terminal(&store, &good.id).await.status,
            TaskStatus::Done
        );
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_canceled_while_buffered_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(
            TaskOperation::ContentPreview,
            handler_fn("ok", |_| async { Ok(HandlerOutput::default()) }),
        );
        let queue = queue_with(store.clone(), registry, 4, 1);

        let task = new_task(&store, TaskOperation::ContentPreview).await;
        let pending = queue.enqueue_task(&task).await.unwrap();
        let canceled = pending.with_status(TaskStatus::Canceled).unwrap();
        store.update_task(&canceled, TaskStatus::Pending).await.unwrap();

        queue.start();
        queue.shutdown().await;

        assert_eq!(store.get_task(&task.id).await.unwrap().status, TaskStatus::Canceled);
        assert_eq!(queue.stats().skipped, 1);
        assert_eq!(queue.stats().completed, 0);
    }
}
