//! Application-wide error types.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::preview::PreviewBatchReport;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict on task {id}: expected status {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    PreviewBatch(PreviewBatchError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn conflict(
        id: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::Conflict {
            id: id.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Store failures that may succeed when tried again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseSqlx(_) | Self::Database(_))
    }
}

/// A single item that failed during a batch preview run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFailure {
    pub container_id: String,
    pub content_id: String,
    pub src: String,
    pub message: String,
}

/// Aggregate failure of a batch preview run.
///
/// Every eligible item was attempted; `failures` lists the ones that did not
/// produce a preview and `reports` keeps the per-container results of the
/// rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewBatchError {
    pub attempted: usize,
    pub generated: usize,
    pub failures: Vec<PreviewFailure>,
    pub reports: Vec<PreviewBatchReport>,
}

impl PreviewBatchError {
    pub fn merge(&mut self, other: PreviewBatchError) {
        self.attempted += other.attempted;
        self.generated += other.generated;
        self.failures.extend(other.failures);
        self.reports.extend(other.reports);
    }

    /// Count a container whose batch finished without failures.
    pub fn record(&mut self, report: PreviewBatchReport) {
        self.attempted += report.generated();
        self.generated += report.generated();
        self.reports.push(report);
    }
}

impl fmt::Display for PreviewBatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} previews failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in self.failures.iter().take(5) {
            write!(f, "; {} ({}): {}", failure.src, failure.content_id, failure.message)?;
        }
        if self.failures.len() > 5 {
            write!(f, "; and {} more", self.failures.len() - 5)?;
        }
        Ok(())
    }
}
