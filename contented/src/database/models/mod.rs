//! Database models.
//!
//! These map directly to the schema; conversion to and from the domain
//! types happens here so repositories deal in domain values.

pub mod catalog;
pub mod task;

pub use catalog::*;
pub use task::*;

use serde::{Deserialize, Serialize};

/// Offset/limit pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}
