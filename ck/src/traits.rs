//! Checkpointer trait definition

use std::path::PathBuf;

use crate::error::CheckpointError;
use crate::model::{Checkpoint, CheckpointRef, CheckpointRequest, CreateOutcome, RollbackReport};

/// Snapshot-before-mutate seam
///
/// Callers that mutate files hold a `Box<dyn Checkpointer>` rather than a
/// concrete store, so the backing storage can be swapped (or faked in tests).
pub trait Checkpointer: Send {
    /// Capture files; a known request id replays a rollback instead
    fn create_checkpoint(&mut self, request: CheckpointRequest) -> Result<CreateOutcome, CheckpointError>;

    /// Restore captured content; never fails as a whole, see the report
    fn rollback(&mut self, reference: &CheckpointRef, files: Option<&[PathBuf]>) -> RollbackReport;

    /// Checkpoints, newest first
    fn list_checkpoints(&self) -> Vec<Checkpoint>;
}
