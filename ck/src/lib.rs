//! CheckpointStore - reversible file snapshots
//!
//! Captures the full text of a set of files before they are mutated, persists
//! the snapshot compressed on disk, and restores it on demand.
//!
//! # Architecture
//!
//! ```text
//! .checkpoints/
//! ├── index.json              # list of checkpoint metadata (source of truth)
//! ├── {checkpoint_id}.ckpt    # header line + gzip(JSON path -> content)
//! └── ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use checkpointstore::{CheckpointRef, CheckpointRequest, CheckpointStore, StoreOptions};
//!
//! let mut store = CheckpointStore::open(".checkpoints", StoreOptions::default())?;
//! store.create_checkpoint(CheckpointRequest::new(vec!["src/lib.rs".into()], "before refactor"))?;
//! // ... mutate src/lib.rs ...
//! let report = store.rollback(&CheckpointRef::Latest, None);
//! ```

pub mod cli;
mod codec;
pub mod config;
pub mod diff;
mod error;
mod model;
mod store;
mod traits;

pub use error::CheckpointError;
pub use model::{
    Checkpoint, CheckpointId, CheckpointRef, CheckpointRequest, CreateOutcome, DiffReport, FileDiff, FileSnapshot,
    RestoreFailure, RollbackReport,
};
pub use store::{BLOB_EXTENSION, CheckpointStore, INDEX_FILE, StoreOptions};
pub use traits::Checkpointer;

/// Default retention limit
pub const DEFAULT_MAX_CHECKPOINTS: usize = 50;
