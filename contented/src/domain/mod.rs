//! Domain layer: tasks and the media catalog entities they act on.

pub mod catalog;
pub mod task;

pub use catalog::{Container, Content, PREVIEW_DIRECTORY, Screen};
pub use task::{
    MAX_SCREENS, OperationScope, Task, TaskOperation, TaskParams, TaskRequest, TaskStatus,
};
