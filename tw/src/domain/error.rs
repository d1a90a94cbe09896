//! Graph error types

use thiserror::Error;

use crate::scheduler::ScheduleError;

/// Errors from task graph construction and mutation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Duplicate task id: {0}")]
    DuplicateId(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Task {0} is completed and cannot change state")]
    CompletedImmutable(String),

    #[error("Cannot expand {0} into an empty sub-graph")]
    EmptyExpansion(String),

    #[error(transparent)]
    Structural(#[from] ScheduleError),
}
