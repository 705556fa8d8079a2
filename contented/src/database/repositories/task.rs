//! Task status store.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::database::models::{Pagination, TaskDbModel};
use crate::database::time::datetime_to_ms;
use crate::domain::{Task, TaskStatus};
use crate::{Error, Result};

/// Filters for listing tasks. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub content_id: Option<String>,
    pub container_id: Option<String>,
    /// Substring matched against the task message.
    pub search: Option<String>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl TaskFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_content(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    /// Whether `task` passes every filter (pagination aside).
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if let Some(id) = &self.content_id
            && task.content_id.as_deref() != Some(id.as_str())
        {
            return false;
        }
        if let Some(id) = &self.container_id
            && task.container_id.as_deref() != Some(id.as_str())
        {
            return false;
        }
        if let Some(search) = &self.search
            && !task.message.contains(search.as_str())
        {
            return false;
        }
        true
    }
}

/// Durable store for tasks.
///
/// `update_task` is the only way to change a stored task's status: it is a
/// compare-and-swap against the status the caller last observed.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Persist a new task. The stored status is always NEW.
    async fn create_task(&self, task: &Task) -> Result<Task>;
    async fn get_task(&self, id: &str) -> Result<Task>;
    /// Apply `task` only if the stored status equals `expected`.
    ///
    /// Fails with `Error::Conflict` on mismatch (leaving the row untouched),
    /// `Error::NotFound` for an unknown id and `Error::InvalidStateTransition`
    /// if `expected -> task.status` is not a legal move.
    async fn update_task(&self, task: &Task, expected: TaskStatus) -> Result<Task>;
    /// Newest first, with the total count before pagination.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<(Vec<Task>, u64)>;
    /// Tasks still NEW or PENDING, oldest first.
    async fn list_queueable_tasks(&self) -> Result<Vec<Task>>;
    /// Move every IN_PROGRESS task to ERROR with `message`. Returns the count.
    async fn fail_interrupted_tasks(&self, message: &str) -> Result<u64>;
}

/// Normalize a task for insertion.
pub(crate) fn prepare_new_task(task: &Task) -> Task {
    let mut task = task.clone();
    let now = Utc::now();
    task.status = TaskStatus::New;
    task.created_at = now;
    task.updated_at = now;
    task.started_at = None;
    task
}

/// SQLx implementation of TaskRepository.
pub struct SqlxTaskRepository {
    pool: SqlitePool,
}

impl SqlxTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &TaskFilter) -> (String, usize) {
        let mut conditions = Vec::new();
        let mut bind_index = 1;

        if filter.status.is_some() {
            conditions.push(format!("status = ${}", bind_index));
            bind_index += 1;
        }
        if filter.content_id.is_some() {
            conditions.push(format!("content_id = ${}", bind_index));
            bind_index += 1;
        }
        if filter.container_id.is_some() {
            conditions.push(format!("container_id = ${}", bind_index));
            bind_index += 1;
        }
        if filter.search.is_some() {
            conditions.push(format!("instr(message, ${}) > 0", bind_index));
            bind_index += 1;
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        (clause, bind_index)
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn create_task(&self, task: &Task) -> Result<Task> {
        let task = prepare_new_task(task);
        let row = TaskDbModel::from(&task);
        sqlx::query(
            r#"
            INSERT INTO task_requests (
                id, content_id, container_id, operation, status, message, err_msg,
                number_of_screens, start_time_seconds, codec, width, height,
                created_id, created_at, updated_at, started_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.content_id)
        .bind(&row.container_id)
        .bind(&row.operation)
        .bind(&row.status)
        .bind(&row.message)
        .bind(&row.err_msg)
        .bind(row.number_of_screens)
        .bind(row.start_time_seconds)
        .bind(&row.codec)
        .bind(row.width)
        .bind(row.height)
        .bind(&row.created_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.started_at)
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        sqlx::query_as::<_, TaskDbModel>("SELECT * FROM task_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Task", id))?
            .try_into()
    }

    async fn update_task(&self, task: &Task, expected: TaskStatus) -> Result<Task> {
        expected.check_update(task.status)?;

        let mut task = task.clone();
        task.updated_at = Utc::now();
        let row = TaskDbModel::from(&task);

        // operation, content_id and container_id are fixed at creation.
        let result = sqlx::query(
            r#"
            UPDATE task_requests SET
                status = ?, message = ?, err_msg = ?,
                number_of_screens = ?, start_time_seconds = ?, codec = ?, width = ?, height = ?,
                created_id = ?, updated_at = ?, started_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(&row.status)
        .bind(&row.message)
        .bind(&row.err_msg)
        .bind(row.number_of_screens)
        .bind(row.start_time_seconds)
        .bind(&row.codec)
        .bind(row.width)
        .bind(row.height)
        .bind(&row.created_id)
        .bind(row.updated_at)
        .bind(row.started_at)
        .bind(&row.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM task_requests WHERE id = ?")
                    .bind(&task.id)
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match current {
                None => Error::not_found("Task", &task.id),
                Some(actual) => Error::conflict(&task.id, expected, actual),
            });
        }

        Ok(task)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<(Vec<Task>, u64)> {
        let (where_clause, bind_index) = Self::where_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM task_requests {}", where_clause);
        let data_sql = format!(
            "SELECT * FROM task_requests {} ORDER BY created_at DESC, id LIMIT ${} OFFSET ${}",
            where_clause,
            bind_index,
            bind_index + 1
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut data_query = sqlx::query_as::<_, TaskDbModel>(&data_sql);
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_str());
            data_query = data_query.bind(status.as_str());
        }
        if let Some(ref id) = filter.content_id {
            count_query = count_query.bind(id);
            data_query = data_query.bind(id);
        }
        if let Some(ref id) = filter.container_id {
            count_query = count_query.bind(id);
            data_query = data_query.bind(id);
        }
        if let Some(ref search) = filter.search {
            count_query = count_query.bind(search);
            data_query = data_query.bind(search);
        }
        data_query = data_query
            .bind(i64::from(filter.pagination.limit))
            .bind(i64::from(filter.pagination.offset));

        let total = count_query.fetch_one(&self.pool).await? as u64;
        let tasks = data_query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((tasks, total))
    }

    async fn list_queueable_tasks(&self) -> Result<Vec<Task>> {
        sqlx::query_as::<_, TaskDbModel>(
            "SELECT * FROM task_requests WHERE status IN ('new', 'pending') ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Task::try_from)
        .collect()
    }

    async fn fail_interrupted_tasks(&self, message: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE task_requests SET status = 'error', err_msg = ?, updated_at = ? WHERE status = 'in_progress'",
        )
        .bind(message)
        .bind(datetime_to_ms(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
