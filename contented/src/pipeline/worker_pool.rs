//! Worker pool: a fixed set of workers that pull tasks from the queue buffer
//! and run them through their registered handler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::HandlerRegistry;
use super::task_queue::QueueCounters;
use crate::database::repositories::TaskRepository;
use crate::database::retry::retry_transient;
use crate::domain::{Task, TaskStatus};
use crate::utils::fs::strip_root;

/// Receiving end of the queue buffer, shared by all workers.
pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<Task>>>;

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent handler invocations.
    pub max_workers: usize,
    /// Removed from task messages before they are stored.
    pub redact_root: Option<PathBuf>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            redact_root: None,
        }
    }
}

/// Resolves handlers and drives a task's status around the handler call.
pub(crate) struct Dispatcher {
    pub(crate) store: Arc<dyn TaskRepository>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) counters: Arc<QueueCounters>,
    pub(crate) redact_root: Option<PathBuf>,
}

impl Dispatcher {
    fn redact(&self, message: &str) -> String {
        match &self.redact_root {
            Some(root) => strip_root(message, root),
            None => message.to_string(),
        }
    }

    async fn dispatch(&self, task: Task) {
        // The buffered copy may be stale; a cancel can land while it waits.
        let loaded = retry_transient("loading queued task", || self.store.get_task(&task.id)).await;
        let current = match loaded {
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                warn!(task_id = %task.id, "Dropping queued task that no longer exists");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to load queued task");
                self.finish_failed(&task, format!("could not load task: {e}")).await;
                return;
            }
        };

        if !current.status.is_queueable() {
            debug!(task_id = %current.id, status = %current.status, "Skipping task that is no longer queued");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(handler) = self.registry.get(current.operation) else {
            let message = format!("no handler registered for operation {}", current.operation);
            warn!(task_id = %current.id, "{}", message);
            self.finish_failed(&current, message).await;
            return;
        };

        let claimed = match current.with_status(TaskStatus::InProgress) {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(task_id = %current.id, error = %e, "Cannot claim task");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let claimed = match retry_transient("claiming task", || {
            self.store.update_task(&claimed, current.status)
        })
        .await
        {
            Ok(claimed) => claimed,
            Err(e) if e.is_conflict() => {
                debug!(task_id = %current.id, "Task changed before it could be claimed");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) => {
                error!(task_id = %current.id, error = %e, "Failed to claim task");
                self.finish_failed(&current, format!("could not claim task: {e}"))
                    .await;
                return;
            }
        };

        debug!(
            task_id = %claimed.id,
            operation = %claimed.operation,
            handler = handler.name(),
            "Running task"
        );

        let running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_observed_running
            .fetch_max(running, Ordering::SeqCst);
        let start = Instant::now();
        let outcome = AssertUnwindSafe(handler.handle(&claimed))
            .catch_unwind()
            .await;
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(output)) => {
                let mut done = match claimed.with_status(TaskStatus::Done) {
                    Ok(done) => done,
                    Err(e) => {
                        error!(task_id = %claimed.id, error = %e, "Cannot complete task");
                        self.finish_failed(&claimed, e.to_string()).await;
                        return;
                    }
                };
                done.message = self.redact(&output.message);
                done.created_id = output.created_id;
                match retry_transient("recording task completion", || {
                    self.store.update_task(&done, TaskStatus::InProgress)
                })
                .await
                {
                    Ok(_) => {
                        self.counters.completed.fetch_add(1, Ordering::Relaxed);
                        info!(
                            task_id = %done.id,
                            operation = %done.operation,
                            "Task completed in {:.2}s",
                            elapsed
                        );
                    }
                    Err(e) if e.is_conflict() => {
                        warn!(task_id = %done.id, error = %e, "Task changed while it was running");
                        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!(task_id = %done.id, error = %e, "Failed to record task completion");
                        self.finish_failed(&claimed, format!("could not record completion: {e}"))
                            .await;
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(task_id = %claimed.id, error = %e, "Task failed after {:.2}s", elapsed);
                self.finish_failed(&claimed, e.to_string()).await;
            }
            Err(panic) => {
                let message = format!("handler {} panicked: {}", handler.name(), panic_message(&*panic));
                error!(task_id = %claimed.id, "{}", message);
                self.finish_failed(&claimed, message).await;
            }
        }
    }

    /// CAS `task` from its current status to ERROR with `message`.
    ///
    /// Transient store errors are retried; if the write still fails the task
    /// is left for startup recovery.
    async fn finish_failed(&self, task: &Task, message: String) {
        let expected = task.status;
        let mut failed = match task.with_status(TaskStatus::Error) {
            Ok(failed) => failed,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Cannot fail task");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        failed.err_msg = self.redact(&message);
        match retry_transient("recording task error", || {
            self.store.update_task(&failed, expected)
        })
        .await
        {
            Ok(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to record task error");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A fixed-size pool of task workers.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    /// One permit per concurrent handler slot.
    semaphore: Arc<Semaphore>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            config,
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    pub(crate) fn start(&self, receiver: SharedReceiver, dispatcher: Arc<Dispatcher>) {
        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("Worker pool already stopped; not starting");
            return;
        };
        if !join_set.is_empty() {
            warn!("Worker pool already started");
            return;
        }

        info!("Starting task worker pool with {} workers", self.config.max_workers);

        for i in 0..self.config.max_workers {
            let semaphore = self.semaphore.clone();
            let cancellation_token = self.cancellation_token.clone();
            let receiver = receiver.clone();
            let dispatcher = dispatcher.clone();

            join_set.spawn(async move {
                debug!("Task worker {} started", i);

                loop {
                    let permit = tokio::select! {
                        _ = cancellation_token.cancelled() => break,
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };

                    let next = tokio::select! {
                        biased;
                        _ = cancellation_token.cancelled() => break,
                        next = async { receiver.lock().await.recv().await } => next,
                    };

                    let Some(task) = next else {
                        // Intake closed and the buffer is drained.
                        break;
                    };
                    dispatcher.counters.queued.fetch_sub(1, Ordering::SeqCst);

                    dispatcher.dispatch(task).await;
                    drop(permit);
                }

                debug!("Task worker {} stopped", i);
            });
        }
    }

    /// Wait for every worker to exit on its own.
    pub async fn join(&self) {
        let join_set = self.tasks.lock().take();
        if let Some(mut join_set) = join_set {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    error!("Task worker terminated abnormally: {}", e);
                }
            }
        }
    }

    /// Stop idle workers and wait for in-flight handlers to finish.
    pub async fn stop(&self) {
        info!("Stopping task worker pool");
        self.cancellation_token.cancel();
        self.join().await;
        info!("Task worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled() && self.tasks.lock().is_some()
    }

    /// Slots not currently held by a worker.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_workers, 4);
        assert!(config.redact_root.is_none());
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(WorkerPoolConfig {
            max_workers: 3,
            redact_root: None,
        });
        assert!(pool.is_running());
        assert_eq!(pool.available_slots(), 3);
        assert_eq!(pool.max_workers(), 3);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
