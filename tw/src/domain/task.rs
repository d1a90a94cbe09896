//! TaskNode domain type
//!
//! A single atomic unit of work in a task graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::category::ErrorCategory;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or the next wave
    #[default]
    Pending,
    /// Dispatched to the executor in the current wave
    InProgress,
    /// Finished successfully; terminal
    Completed,
    /// Failed and not recoverable
    Failed,
    /// Never ran because the graph stopped first
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What a task does, with the fields each variant requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Write or modify code in a file
    Code {
        file_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// Run a shell command
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path: Option<PathBuf>,
    },
    /// Run a test command; never mutates files
    Test { command: String },
}

impl TaskKind {
    /// Short name of the variant
    pub fn name(&self) -> &'static str {
        match self {
            Self::Code { .. } => "code",
            Self::Command { .. } => "command",
            Self::Test { .. } => "test",
        }
    }

    /// Target file, if any
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Code { file_path, .. } => Some(file_path),
            Self::Command { file_path, .. } => file_path.as_deref(),
            Self::Test { .. } => None,
        }
    }

    /// Literal command, if any; blank commands count as none
    pub fn command(&self) -> Option<&str> {
        let command = match self {
            Self::Code { command, .. } => command.as_deref(),
            Self::Command { command, .. } | Self::Test { command } => Some(command.as_str()),
        };
        command.filter(|c| !c.trim().is_empty())
    }

    /// Whether running the task may change persistent state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Test { .. })
    }

    /// Executor role that handles this kind by default
    pub fn default_capability(&self) -> &'static str {
        match self {
            Self::Code { .. } => "coder",
            Self::Command { .. } => "shell",
            Self::Test { .. } => "tester",
        }
    }
}

/// Where a task came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOrigin {
    /// Produced by the planner (or decomposition)
    #[default]
    Planned,
    /// Inserted by the recovery engine to repair `parent`
    Fix {
        parent: String,
        category: ErrorCategory,
        strategy: String,
    },
}

/// A unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique identifier within a graph
    pub id: String,

    /// Human-readable intent
    pub description: String,

    #[serde(flatten)]
    pub kind: TaskKind,

    pub status: TaskStatus,

    /// Ids that must complete first
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Post-condition check run after the task itself
    #[serde(default)]
    pub validation_command: Option<String>,

    /// Executor role that handles this task
    pub assigned_capability: String,

    /// Fix tasks inserted on behalf of this task so far
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub origin: TaskOrigin,

    pub created_at: DateTime<Utc>,
}

impl TaskNode {
    /// Create a pending task with the kind's default capability
    pub fn new(id: impl Into<String>, description: impl Into<String>, kind: TaskKind) -> Self {
        let id = id.into();
        debug!(%id, kind = kind.name(), "TaskNode::new: called");
        Self {
            assigned_capability: kind.default_capability().to_string(),
            id,
            description: description.into(),
            kind,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            validation_command: None,
            retry_count: 0,
            origin: TaskOrigin::Planned,
            created_at: Utc::now(),
        }
    }

    /// Shorthand for a code task
    pub fn new_code(id: impl Into<String>, description: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self::new(
            id,
            description,
            TaskKind::Code {
                file_path: file_path.into(),
                command: None,
            },
        )
    }

    /// Shorthand for a command task
    pub fn new_command(id: impl Into<String>, description: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(
            id,
            description,
            TaskKind::Command {
                command: command.into(),
                file_path: None,
            },
        )
    }

    /// Shorthand for a test task
    pub fn new_test(id: impl Into<String>, description: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(id, description, TaskKind::Test { command: command.into() })
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validation(mut self, command: impl Into<String>) -> Self {
        self.validation_command = Some(command.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.assigned_capability = capability.into();
        self
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.kind.file_path()
    }

    pub fn command(&self) -> Option<&str> {
        self.kind.command()
    }

    pub fn is_mutating(&self) -> bool {
        self.kind.is_mutating()
    }

    /// Parent task id when this is a fix task
    pub fn fix_parent(&self) -> Option<&str> {
        match &self.origin {
            TaskOrigin::Fix { parent, .. } => Some(parent),
            TaskOrigin::Planned => None,
        }
    }

    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_accessors() {
        let code = TaskKind::Code {
            file_path: PathBuf::from("src/lib.rs"),
            command: Some("cargo fmt".to_string()),
        };
        assert_eq!(code.file_path(), Some(Path::new("src/lib.rs")));
        assert_eq!(code.command(), Some("cargo fmt"));
        assert!(code.is_mutating());

        let test = TaskKind::Test {
            command: "cargo test".to_string(),
        };
        assert_eq!(test.file_path(), None);
        assert!(!test.is_mutating());

        let blank = TaskKind::Command {
            command: "  ".to_string(),
            file_path: None,
        };
        assert_eq!(blank.command(), None);
    }

    #[test]
    fn test_new_task_defaults() {
        let task = TaskNode::new_command("t1", "install deps", "npm install");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.assigned_capability, "shell");
        assert_eq!(task.origin, TaskOrigin::Planned);
        assert!(task.fix_parent().is_none());
    }

    #[test]
    fn test_serialize_flattens_kind_and_origin() {
        let task = TaskNode::new_code("t1", "write module", "src/a.rs").with_dependencies(["t0"]);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "code");
        assert_eq!(json["file_path"], "src/a.rs");
        assert_eq!(json["origin"]["type"], "planned");
        assert_eq!(json["status"], "pending");

        let back: TaskNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_fix_origin_round_trips() {
        let mut task = TaskNode::new_command("t1-fix-1", "install", "pip install x");
        task.origin = TaskOrigin::Fix {
            parent: "t1".to_string(),
            category: ErrorCategory::MissingDependencies,
            strategy: "install the missing package".to_string(),
        };
        let json = serde_json::to_string(&task).unwrap();
        let back: TaskNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fix_parent(), Some("t1"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(TaskStatus::Skipped.to_string(), "skipped");
    }
}
