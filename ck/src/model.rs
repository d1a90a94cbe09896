//! Checkpoint data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Unique identifier for a checkpoint
pub type CheckpointId = String;

/// Captured file contents keyed by path
pub type FileSnapshot = BTreeMap<String, String>;

/// Metadata for a single checkpoint (one entry of the index)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint ID
    pub checkpoint_id: CheckpointId,
    /// Monotonic creation order within a store
    pub sequence: u64,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Paths captured in the snapshot
    pub modified_files: Vec<String>,
    /// SHA-256 over every captured path and content
    pub content_hash: String,
    /// Human-readable reason for the checkpoint
    pub description: String,
    /// Session correlation key
    #[serde(default)]
    pub session_id: Option<String>,
    /// Request correlation key (replaying a request id triggers rollback)
    #[serde(default)]
    pub request_id: Option<String>,
    /// Retention weight; low-confidence checkpoints are evicted first
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Parameters for creating a checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointRequest {
    /// Files to capture; empty means every tracked file
    pub files: Vec<PathBuf>,
    pub description: String,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub confidence: f64,
}

impl CheckpointRequest {
    pub fn new(files: Vec<PathBuf>, description: impl Into<String>) -> Self {
        Self {
            files,
            description: description.into(),
            session_id: None,
            request_id: None,
            confidence: default_confidence(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Result of `create_checkpoint`
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// A new checkpoint was recorded
    Created(Checkpoint),
    /// The request id was already known; the store rolled back to it instead
    Replayed {
        checkpoint_id: CheckpointId,
        rollback: RollbackReport,
    },
}

impl CreateOutcome {
    pub fn checkpoint_id(&self) -> &str {
        match self {
            Self::Created(cp) => &cp.checkpoint_id,
            Self::Replayed { checkpoint_id, .. } => checkpoint_id,
        }
    }
}

/// Symbolic or concrete reference to a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointRef {
    /// Most recent checkpoint
    Latest,
    /// The one before the most recent
    Previous,
    /// A specific checkpoint id
    Id(CheckpointId),
}

impl CheckpointRef {
    pub fn parse(s: &str) -> Self {
        match s {
            "latest" => Self::Latest,
            "previous" => Self::Previous,
            other => Self::Id(other.to_string()),
        }
    }
}

impl std::fmt::Display for CheckpointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Previous => write!(f, "previous"),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

/// A file that could not be restored
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreFailure {
    pub path: String,
    pub message: String,
}

/// Per-file outcome of a rollback
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    /// Resolved checkpoint id (None when the reference did not resolve)
    pub checkpoint_id: Option<CheckpointId>,
    pub restored_files: Vec<String>,
    pub failed_files: Vec<RestoreFailure>,
    /// The reference did not resolve to a checkpoint
    pub not_found: bool,
    /// Set when the snapshot blob could not be read
    pub error: Option<String>,
    pub success: bool,
}

impl RollbackReport {
    pub(crate) fn not_found(reference: &CheckpointRef) -> Self {
        Self {
            not_found: true,
            error: Some(format!("Checkpoint not found: {}", reference)),
            ..Default::default()
        }
    }
}

/// Diff output for one file
#[derive(Debug, Clone)]
pub struct FileDiff {
    pub path: String,
    /// Unified-style text; empty when unchanged
    pub text: String,
}

impl FileDiff {
    pub fn is_unchanged(&self) -> bool {
        self.text.is_empty()
    }
}

/// Diff of a checkpoint against current disk content
#[derive(Debug, Clone)]
pub struct DiffReport {
    pub checkpoint_id: CheckpointId,
    pub files: Vec<FileDiff>,
}

impl DiffReport {
    /// Concatenated diff text for every changed file
    pub fn text(&self) -> String {
        self.files
            .iter()
            .filter(|d| !d.is_unchanged())
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}
