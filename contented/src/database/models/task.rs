//! Task database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{Task, TaskOperation, TaskParams, TaskStatus};
use crate::{Error, Result};

/// Row of the `task_requests` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskDbModel {
    pub id: String,
    pub content_id: Option<String>,
    pub container_id: Option<String>,
    pub operation: String,
    /// new, pending, in_progress, done, error, canceled
    pub status: String,
    pub message: String,
    pub err_msg: String,
    pub number_of_screens: i64,
    pub start_time_seconds: i64,
    pub codec: String,
    pub width: i64,
    pub height: i64,
    pub created_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
}

impl From<&Task> for TaskDbModel {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            content_id: task.content_id.clone(),
            container_id: task.container_id.clone(),
            operation: task.operation.as_str().to_string(),
            status: task.status.as_str().to_string(),
            message: task.message.clone(),
            err_msg: task.err_msg.clone(),
            number_of_screens: i64::from(task.params.number_of_screens),
            start_time_seconds: i64::from(task.params.start_time_seconds),
            codec: task.params.codec.clone(),
            width: i64::from(task.params.width),
            height: i64::from(task.params.height),
            created_id: task.created_id.clone(),
            created_at: datetime_to_ms(task.created_at),
            updated_at: datetime_to_ms(task.updated_at),
            started_at: task.started_at.map(datetime_to_ms),
        }
    }
}

impl TryFrom<TaskDbModel> for Task {
    type Error = Error;

    fn try_from(row: TaskDbModel) -> Result<Self> {
        let operation = TaskOperation::parse(&row.operation).ok_or_else(|| {
            Error::Database(format!("task {} has unknown operation '{}'", row.id, row.operation))
        })?;
        let status = TaskStatus::parse(&row.status).ok_or_else(|| {
            Error::Database(format!("task {} has unknown status '{}'", row.id, row.status))
        })?;

        Ok(Task {
            content_id: row.content_id,
            container_id: row.container_id,
            operation,
            status,
            message: row.message,
            err_msg: row.err_msg,
            params: TaskParams {
                number_of_screens: u32::try_from(row.number_of_screens).unwrap_or(0),
                start_time_seconds: u32::try_from(row.start_time_seconds).unwrap_or(0),
                codec: row.codec,
                width: i32::try_from(row.width).unwrap_or(-1),
                height: i32::try_from(row.height).unwrap_or(-1),
            },
            created_id: row.created_id,
            created_at: ms_to_datetime(row.created_at),
            updated_at: ms_to_datetime(row.updated_at),
            started_at: row.started_at.map(ms_to_datetime),
            id: row.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskRequest;

    #[test]
    fn test_task_row_conversion() {
        let task = Task::new(TaskRequest::for_content(TaskOperation::Encoding, "c1"));
        let row = TaskDbModel::from(&task);
        assert_eq!(row.operation, "video_encoding");
        assert_eq!(row.status, "new");

        let back = Task::try_from(row).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.operation, TaskOperation::Encoding);
        assert_eq!(back.params, task.params);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let task = Task::new(TaskRequest::for_content(TaskOperation::Encoding, "c1"));
        let mut row = TaskDbModel::from(&task);
        row.status = "paused".to_string();
        assert!(matches!(Task::try_from(row), Err(Error::Database(_))));
    }
}
