//! Task entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OperationScope, TaskOperation, TaskStatus};
use crate::{Error, Result};

/// Upper bound on screens captured for one video.
pub const MAX_SCREENS: u32 = 300;

fn default_number_of_screens() -> u32 {
    12
}

fn default_codec() -> String {
    "libx265".to_string()
}

fn default_dimension() -> i32 {
    -1
}

/// Operation parameters carried by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    #[serde(default = "default_number_of_screens")]
    pub number_of_screens: u32,
    #[serde(default)]
    pub start_time_seconds: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Target width, -1 keeps the source value.
    #[serde(default = "default_dimension")]
    pub width: i32,
    /// Target height, -1 keeps the source value.
    #[serde(default = "default_dimension")]
    pub height: i32,
}

impl Default for TaskParams {
    fn default() -> Self {
        Self {
            number_of_screens: default_number_of_screens(),
            start_time_seconds: 0,
            codec: default_codec(),
            width: default_dimension(),
            height: default_dimension(),
        }
    }
}

impl TaskParams {
    /// Screen counts outside `1..=MAX_SCREENS` are rejected.
    pub fn validate_screens(&self) -> Result<()> {
        if (1..=MAX_SCREENS).contains(&self.number_of_screens) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "number_of_screens must be between 1 and {}, got {}",
                MAX_SCREENS, self.number_of_screens
            )))
        }
    }
}

/// Inbound request to create a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub operation: TaskOperation,
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub params: TaskParams,
}

impl TaskRequest {
    pub fn for_content(operation: TaskOperation, content_id: impl Into<String>) -> Self {
        Self {
            operation,
            content_id: Some(content_id.into()),
            container_id: None,
            params: TaskParams::default(),
        }
    }

    pub fn for_container(operation: TaskOperation, container_id: impl Into<String>) -> Self {
        Self {
            operation,
            content_id: None,
            container_id: Some(container_id.into()),
            params: TaskParams::default(),
        }
    }

    pub fn with_params(mut self, params: TaskParams) -> Self {
        self.params = params;
        self
    }

    /// Check the request before a task is created for it. Returns the target id.
    pub fn validate(&self) -> Result<&str> {
        let target = self.target_id()?;
        if self.operation == TaskOperation::ScreenCapture {
            self.params.validate_screens()?;
        }
        Ok(target)
    }

    /// The reference the operation acts on.
    ///
    /// Fails with a validation error when the reference required by the
    /// operation's scope is missing or blank.
    pub fn target_id(&self) -> Result<&str> {
        let (target, label) = match self.operation.scope() {
            OperationScope::Content => (self.content_id.as_deref(), "content_id"),
            OperationScope::Container => (self.container_id.as_deref(), "container_id"),
        };
        match target {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(Error::validation(format!(
                "operation {} requires {}",
                self.operation, label
            ))),
        }
    }
}

/// A unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub content_id: Option<String>,
    pub container_id: Option<String>,
    pub operation: TaskOperation,
    pub status: TaskStatus,
    pub message: String,
    pub err_msg: String,
    pub params: TaskParams,
    /// Content created as a result of this task (e.g. an encoded copy).
    pub created_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task from a request. Status always starts at NEW.
    pub fn new(request: TaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: request.content_id,
            container_id: request.container_id,
            operation: request.operation,
            status: TaskStatus::New,
            message: String::new(),
            err_msg: String::new(),
            params: request.params,
            created_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
        }
    }

    /// The id of the content or container this task targets.
    pub fn target_id(&self) -> Result<&str> {
        let target = match self.operation.scope() {
            OperationScope::Content => self.content_id.as_deref(),
            OperationScope::Container => self.container_id.as_deref(),
        };
        target.ok_or_else(|| {
            Error::validation(format!("task {} has no target for {}", self.id, self.operation))
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Copy of this task moved to `status`, validated against the state machine.
    pub fn with_status(&self, status: TaskStatus) -> Result<Self> {
        let status = self.status.transition_to(status)?;
        let mut next = self.clone();
        next.status = status;
        next.updated_at = Utc::now();
        if status == TaskStatus::InProgress {
            next.started_at = Some(next.updated_at);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_new() {
        let task = Task::new(TaskRequest::for_content(TaskOperation::ScreenCapture, "c1"));
        assert_eq!(task.status, TaskStatus::New);
        assert_eq!(task.params.number_of_screens, 12);
        assert_eq!(task.params.codec, "libx265");
        assert_eq!(task.params.width, -1);
        assert!(task.created_id.is_none());
        assert!(uuid::Uuid::parse_str(&task.id).is_ok());
    }

    #[test]
    fn test_request_target_validation() {
        let ok = TaskRequest::for_container(TaskOperation::ContainerPreviews, "box");
        assert_eq!(ok.target_id().unwrap(), "box");

        let wrong_scope = TaskRequest::for_container(TaskOperation::Encoding, "box");
        assert!(matches!(wrong_scope.target_id(), Err(Error::Validation(_))));

        let blank = TaskRequest::for_content(TaskOperation::ContentPreview, "  ");
        assert!(matches!(blank.target_id(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_screen_count_bounds() {
        let request = |count: u32| {
            let mut request = TaskRequest::for_content(TaskOperation::ScreenCapture, "c1");
            request.params.number_of_screens = count;
            request
        };
        for count in [0, MAX_SCREENS + 1, u32::MAX] {
            assert!(matches!(request(count).validate(), Err(Error::Validation(_))));
        }
        assert_eq!(request(1).validate().unwrap(), "c1");
        assert!(request(MAX_SCREENS).validate().is_ok());

        // Only screen capture reads the count.
        let mut encoding = TaskRequest::for_content(TaskOperation::Encoding, "c1");
        encoding.params.number_of_screens = 0;
        assert!(encoding.validate().is_ok());
    }

    #[test]
    fn test_with_status_stamps_start() {
        let task = Task::new(TaskRequest::for_content(TaskOperation::ContentPreview, "c1"));
        let claimed = task.with_status(TaskStatus::InProgress).unwrap();
        assert_eq!(claimed.status, TaskStatus::InProgress);
        assert!(claimed.started_at.is_some());
        assert!(claimed.with_status(TaskStatus::Canceled).is_err());
    }

    #[test]
    fn test_request_deserialize_defaults() {
        let json = r#"{"operation":"screen_capture","content_id":"abc"}"#;
        let request: TaskRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.operation, TaskOperation::ScreenCapture);
        assert_eq!(request.params, TaskParams::default());
    }
}
