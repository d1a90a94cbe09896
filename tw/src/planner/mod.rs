//! Planner boundary
//!
//! The planner is an external, unreliable collaborator: it hands back loosely
//! shaped task records. Everything here converts those records into a
//! validated [`TaskGraph`](crate::domain::TaskGraph) before the scheduler sees
//! them, and optionally expands coarse tasks into sub-graphs beforehand.

mod decompose;
mod file;
mod ingest;

pub use decompose::{DEFAULT_MAX_DEPTH, Decomposer, decompose_graph};
pub use file::FilePlanner;
pub use ingest::{IngestError, IngestOptions, ingest};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::GraphError;

/// A task record as the planner produced it; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedTask {
    pub id: Option<String>,
    pub description: Option<String>,
    /// Free-form kind name; inferred when absent
    #[serde(alias = "type")]
    pub kind: Option<String>,
    #[serde(alias = "filePath", alias = "file")]
    pub file_path: Option<String>,
    pub command: Option<String>,
    #[serde(alias = "deps", alias = "dependsOn")]
    pub dependencies: Vec<String>,
    #[serde(alias = "validationCommand", alias = "validate")]
    pub validation_command: Option<String>,
    #[serde(alias = "assignedCapability", alias = "capability")]
    pub assigned_capability: Option<String>,
}

impl PlannedTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// What the planner knows about the project a request targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub root: PathBuf,
    pub name: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ProjectMetadata {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

/// Planner and decomposer failures
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Planner unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid planner response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read plan: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Produces the initial task records for a request
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &str, project: &ProjectMetadata) -> Result<Vec<PlannedTask>, PlannerError>;
}

/// Planner that returns a fixed list, for tests and replays
#[derive(Debug, Clone, Default)]
pub struct StaticPlanner {
    tasks: Vec<PlannedTask>,
}

impl StaticPlanner {
    pub fn new(tasks: Vec<PlannedTask>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _request: &str, _project: &ProjectMetadata) -> Result<Vec<PlannedTask>, PlannerError> {
        tracing::debug!(count = self.tasks.len(), "StaticPlanner::plan: called");
        Ok(self.tasks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_task_accepts_aliases() {
        let json = r#"{
            "id": "t1",
            "type": "code",
            "filePath": "src/main.rs",
            "deps": ["t0"],
            "validationCommand": "cargo check",
            "capability": "coder"
        }"#;
        let task: PlannedTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.kind.as_deref(), Some("code"));
        assert_eq!(task.file_path.as_deref(), Some("src/main.rs"));
        assert_eq!(task.dependencies, vec!["t0"]);
        assert_eq!(task.validation_command.as_deref(), Some("cargo check"));
        assert_eq!(task.assigned_capability.as_deref(), Some("coder"));
    }

    #[test]
    fn test_planned_task_all_optional() {
        let task: PlannedTask = serde_json::from_str("{}").unwrap();
        assert_eq!(task, PlannedTask::default());
    }

    #[tokio::test]
    async fn test_static_planner_returns_tasks() {
        let planner = StaticPlanner::new(vec![PlannedTask::new("a", "first")]);
        let tasks = planner.plan("anything", &ProjectMetadata::new(".")).await.unwrap();
        assert_eq!(tasks.len(), 1);
    }
}
