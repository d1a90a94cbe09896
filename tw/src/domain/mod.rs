//! Domain types for taskweave
//!
//! Core domain types: TaskNode, TaskGraph, RecoveryAttempt.
//! The graph is the unit every other component operates on.

mod category;
mod error;
mod graph;
mod task;

pub use category::ErrorCategory;
pub use error::GraphError;
pub use graph::TaskGraph;
pub use task::{TaskKind, TaskNode, TaskOrigin, TaskStatus};

use serde::{Deserialize, Serialize};

/// One recovery step: which task failed, how it was classified, and the fix inserted for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub parent: String,
    pub category: ErrorCategory,
    pub fix_task_id: String,
    pub strategy: String,
}
