//! Task handler trait and related types.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::domain::Task;

/// What a successful handler run reports back onto the task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutput {
    /// Informational message stored on the task.
    pub message: String,
    /// Content created by the run, if any.
    pub created_id: Option<String>,
}

impl HandlerOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            created_id: None,
        }
    }

    pub fn with_created_id(mut self, id: impl Into<String>) -> Self {
        self.created_id = Some(id.into());
        self
    }
}

/// Performs the work of one task operation.
///
/// Handlers run to completion once started; an error marks only the task
/// being handled as failed.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, task: &Task) -> Result<HandlerOutput>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F, Fut> {
    name: &'static str,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F, Fut>
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, task: &Task) -> Result<HandlerOutput> {
        (self.f)(task.clone()).await
    }
}

/// Build a handler from an async closure.
pub fn handler_fn<F, Fut>(name: &'static str, f: F) -> Arc<dyn TaskHandler>
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
{
    Arc::new(FnHandler {
        name,
        f,
        _fut: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskOperation, TaskRequest};

    #[tokio::test]
    async fn test_handler_fn() {
        let handler = handler_fn("echo", |task: Task| async move {
            Ok(HandlerOutput::message(format!("handled {}", task.operation)))
        });
        let task = Task::new(TaskRequest::for_content(TaskOperation::ContentPreview, "c"));
        let output = handler.handle(&task).await.unwrap();
        assert_eq!(handler.name(), "echo");
        assert_eq!(output.message, "handled content_preview");
        assert!(output.created_id.is_none());
    }
}
