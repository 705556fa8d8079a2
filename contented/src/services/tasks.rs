//! Task submission, lookup and cancellation.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database::repositories::{CatalogRepository, TaskFilter, TaskRepository};
use crate::domain::{OperationScope, Task, TaskRequest, TaskStatus};
use crate::pipeline::TaskQueue;
use crate::{Error, Result};

const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

/// Result of a cancel request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CancelOutcome {
    Canceled { task: Task },
    /// The task had already left NEW/PENDING; nothing was changed.
    NotCancelable { status: TaskStatus },
}

/// Counts from startup recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub interrupted: u64,
    pub requeued: usize,
}

/// Front door for creating and managing tasks.
#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    catalog: Arc<dyn CatalogRepository>,
    queue: Arc<TaskQueue>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        catalog: Arc<dyn CatalogRepository>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            tasks,
            catalog,
            queue,
        }
    }

    /// Create a task and hand it to the queue. Returns the task id.
    ///
    /// The request must validate and its target content or container must
    /// exist. Waits while the queue
    /// buffer is full; the task's outcome is only observable through
    /// [`TaskService::get`].
    pub async fn submit(&self, request: TaskRequest) -> Result<String> {
        let target = request.validate()?.to_string();
        match request.operation.scope() {
            OperationScope::Content => {
                let content = self.catalog.get_content(&target).await?;
                if let Some(container_id) = &request.container_id
                    && container_id != &content.container_id
                {
                    return Err(Error::validation(format!(
                        "content {} does not belong to container {}",
                        target, container_id
                    )));
                }
            }
            OperationScope::Container => {
                self.catalog.get_container(&target).await?;
            }
        }

        let task = self.tasks.create_task(&Task::new(request)).await?;
        debug!(task_id = %task.id, operation = %task.operation, "Task created");
        self.queue.enqueue_task(&task).await?;
        Ok(task.id)
    }

    pub async fn get(&self, id: &str) -> Result<Task> {
        self.tasks.get_task(id).await
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<(Vec<Task>, u64)> {
        self.tasks.list_tasks(filter).await
    }

    /// Cancel a task that has not started yet.
    ///
    /// Losing the race against a worker claiming the task is not an error:
    /// the outcome reports the status the task moved to instead.
    pub async fn cancel(&self, id: &str) -> Result<CancelOutcome> {
        let task = self.tasks.get_task(id).await?;
        if !task.status.can_transition_to(TaskStatus::Canceled) {
            return Ok(CancelOutcome::NotCancelable {
                status: task.status,
            });
        }

        let canceled = task.with_status(TaskStatus::Canceled)?;
        match self.tasks.update_task(&canceled, task.status).await {
            Ok(task) => {
                info!(task_id = %task.id, "Task canceled");
                Ok(CancelOutcome::Canceled { task })
            }
            Err(e) if e.is_conflict() => {
                let current = self.tasks.get_task(id).await?;
                debug!(task_id = %id, status = %current.status, "Cancel lost the race");
                Ok(CancelOutcome::NotCancelable {
                    status: current.status,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Reconcile tasks left over from a previous run.
    ///
    /// Tasks caught IN_PROGRESS are failed; NEW and PENDING tasks are queued
    /// again, oldest first. The queue must be started.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let interrupted = self.tasks.fail_interrupted_tasks(INTERRUPTED_MESSAGE).await?;
        if interrupted > 0 {
            warn!(count = interrupted, "Failed tasks interrupted by restart");
        }

        let mut requeued = 0;
        for task in self.tasks.list_queueable_tasks().await? {
            match self.queue.enqueue_task(&task).await {
                Ok(_) => requeued += 1,
                Err(e) => warn!(task_id = %task.id, error = %e, "Failed to requeue task"),
            }
        }
        if requeued > 0 {
            info!(count = requeued, "Requeued pending tasks");
        }
        Ok(RecoveryReport {
            interrupted,
            requeued,
        })
    }
}
