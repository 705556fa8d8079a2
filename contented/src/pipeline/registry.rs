//! Handler registry: maps an operation to the handler that performs it.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::handlers::TaskHandler;
use crate::domain::TaskOperation;

/// Registered task handlers, shared between the composition root and the
/// worker pool.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<TaskOperation, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `operation`, replacing and returning any
    /// previous registration.
    pub fn register(
        &self,
        operation: TaskOperation,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Arc<dyn TaskHandler>> {
        debug!(%operation, handler = handler.name(), "Registering task handler");
        self.handlers.insert(operation, handler)
    }

    pub fn get(&self, operation: TaskOperation) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&operation).map(|h| h.value().clone())
    }

    pub fn contains(&self, operation: TaskOperation) -> bool {
        self.handlers.contains_key(&operation)
    }

    pub fn operations(&self) -> Vec<TaskOperation> {
        self.handlers.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
