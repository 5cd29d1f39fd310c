//! Task creation, assignment, and tracking for fabric components.
//!
//! Tasks advertise the capabilities they require; the manager matches them
//! against registered components and keeps an append-only status history
//! per task.

#![warn(missing_docs, clippy::pedantic)]

mod manager;
mod task;

use fabric_primitives::ErrorKind;
use thiserror::Error;

pub use manager::{TaskCallback, TaskManager};
pub use task::{StatusEntry, Task, TaskBuilder, TaskPriority, TaskStatus};

/// Result alias for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors emitted by the task manager.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No task exists with the given id.
    #[error("task `{id}` not found")]
    NotFound {
        /// The missing task id.
        id: String,
    },

    /// The task has reached a terminal status and rejects further updates.
    #[error("task `{id}` is terminal ({status}) and cannot be updated")]
    Terminal {
        /// The task id.
        id: String,
        /// Its terminal status.
        status: TaskStatus,
    },

    /// Task construction failed validation.
    #[error("invalid task: {reason}")]
    Invalid {
        /// Why the task was rejected.
        reason: String,
    },
}

impl TaskError {
    /// Returns the taxonomy classification for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Terminal { .. } => ErrorKind::Conflict,
            Self::Invalid { .. } => ErrorKind::InvalidArgument,
        }
    }
}
