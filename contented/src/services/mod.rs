//! Service layer module.
//!
//! This module provides the service container and the task service built on
//! top of the pipeline.

pub mod container;
pub mod tasks;

pub use container::ServiceContainer;
pub use tasks::{CancelOutcome, RecoveryReport, TaskService};
