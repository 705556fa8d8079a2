//! Asynchronous task pipeline.
//!
//! Tasks are buffered in a bounded FIFO ([`TaskQueue`]) and executed by a
//! fixed-size [`WorkerPool`]. Each task's operation is resolved to a
//! [`TaskHandler`] through the [`HandlerRegistry`]; status changes go through
//! the task repository's compare-and-swap update.

pub mod handlers;
mod registry;
mod task_queue;
mod worker_pool;

pub use handlers::{HandlerOutput, TaskHandler, handler_fn, register_default_handlers};
pub use registry::HandlerRegistry;
pub use task_queue::{QueueStats, TaskQueue, TaskQueueConfig};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
