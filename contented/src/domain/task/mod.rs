//! Task entity, operations and the status state machine.

mod entity;
mod operation;
mod state;

pub use entity::{MAX_SCREENS, Task, TaskParams, TaskRequest};
pub use operation::{OperationScope, TaskOperation};
pub use state::TaskStatus;
