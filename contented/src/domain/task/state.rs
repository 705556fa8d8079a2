//! Task status state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle status of a task.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet handed to the queue.
    #[default]
    New,
    /// Sitting in the queue buffer.
    Pending,
    /// Claimed by a worker; the handler is running.
    InProgress,
    Done,
    Error,
    Canceled,
}

impl TaskStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    /// Statuses a task may still be canceled or claimed from.
    pub fn is_queueable(&self) -> bool {
        matches!(self, Self::New | Self::Pending)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        match (self, target) {
            (New, Pending) => true,
            (New | Pending, InProgress) => true,
            (New | Pending, Canceled) => true,
            (New | Pending | InProgress, Error) => true,
            (InProgress, Done) => true,
            _ => false,
        }
    }

    /// Attempt to transition to a new status.
    pub fn transition_to(&self, target: TaskStatus) -> Result<TaskStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }

    /// Check that a stored task in `self` may be overwritten with `target`.
    ///
    /// Same-status writes (e.g. updating a message) are allowed only while
    /// the task is not terminal.
    pub fn check_update(&self, target: TaskStatus) -> Result<(), Error> {
        if *self == target && !self.is_terminal() {
            return Ok(());
        }
        self.transition_to(target).map(|_| ())
    }
}
