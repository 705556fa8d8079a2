//! Repository layer.
//!
//! Traits here are the capability interfaces the pipeline depends on; the
//! sqlx implementations back them with SQLite and `crate::storage::MemoryStore`
//! backs them in memory.

pub mod catalog;
pub mod task;

pub use catalog::*;
pub use task::*;
