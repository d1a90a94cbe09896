//! Checkpoint store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {id}")]
    NotFound { id: String },

    #[error("Checkpoint {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Failed to capture {path}")]
    Capture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No files requested and no tracked files to snapshot")]
    EmptySnapshot,

    #[error("File {path} is not part of checkpoint {id}")]
    FileNotInCheckpoint { id: String, path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    /// True for the "local, non-fatal" failures a caller may simply report
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::FileNotInCheckpoint { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CheckpointError::NotFound { id: "abc".to_string() };
        assert!(err.to_string().contains("abc"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_corrupt_is_not_not_found() {
        let err = CheckpointError::Corrupt {
            id: "abc".to_string(),
            reason: "bad gzip".to_string(),
        };
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("bad gzip"));
    }
}
