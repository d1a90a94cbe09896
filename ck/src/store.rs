//! Core CheckpointStore implementation

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec;
use crate::diff::{DEFAULT_CONTEXT, unified_diff};
use crate::error::CheckpointError;
use crate::model::{
    Checkpoint, CheckpointId, CheckpointRef, CheckpointRequest, CreateOutcome, DiffReport, FileDiff, FileSnapshot,
    RestoreFailure, RollbackReport,
};
use crate::traits::Checkpointer;

/// Name of the index file inside the store directory
pub const INDEX_FILE: &str = "index.json";

/// Extension of per-checkpoint blob files
pub const BLOB_EXTENSION: &str = "ckpt";

/// Options for a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Retention limit; lowest-scoring checkpoints are evicted beyond it
    pub max_checkpoints: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_checkpoints: crate::DEFAULT_MAX_CHECKPOINTS,
        }
    }
}

/// File-backed checkpoint store
///
/// Owns the checkpoint directory: the index, the blobs, and an in-memory
/// cache of snapshots that have been created or loaded in this process.
pub struct CheckpointStore {
    base_path: PathBuf,
    options: StoreOptions,
    /// Index entries in creation order (ascending sequence)
    index: Vec<Checkpoint>,
    cache: HashMap<CheckpointId, FileSnapshot>,
    tracked: BTreeSet<PathBuf>,
    next_sequence: u64,
}

impl CheckpointStore {
    /// Open or create a checkpoint store at the given path
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, CheckpointError> {
        let base_path = path.as_ref().to_path_buf();
        debug!(?base_path, max = options.max_checkpoints, "CheckpointStore::open: called");
        fs::create_dir_all(&base_path)?;

        let mut store = Self {
            base_path,
            options,
            index: Vec::new(),
            cache: HashMap::new(),
            tracked: BTreeSet::new(),
            next_sequence: 1,
        };
        store.load_index()?;
        debug!(count = store.index.len(), "CheckpointStore::open: index loaded");
        Ok(store)
    }

    /// Directory this store owns
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join(INDEX_FILE)
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", id, BLOB_EXTENSION))
    }

    fn load_index(&mut self) -> Result<(), CheckpointError> {
        debug!("load_index: called");
        let index_path = self.index_path();
        let loaded = match fs::read(&index_path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<Checkpoint>>(&bytes) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!(path = %index_path.display(), error = %e, "Checkpoint index unreadable, rebuilding");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let Some(entries) = loaded else {
            let rebuilt = self.scan_blobs()?;
            self.set_index(rebuilt);
            return self.save_index();
        };

        let before = entries.len();
        let kept: Vec<Checkpoint> = entries
            .into_iter()
            .filter(|cp| {
                let exists = self.blob_path(&cp.checkpoint_id).exists();
                if !exists {
                    warn!(id = %cp.checkpoint_id, "Dropping index entry without blob");
                }
                exists
            })
            .collect();
        let dropped = before != kept.len();
        self.set_index(kept);
        if dropped {
            self.save_index()?;
        }
        Ok(())
    }

    /// Rebuild index entries from blob headers, skipping corrupt files
    fn scan_blobs(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        debug!("scan_blobs: called");
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().map(|e| e != BLOB_EXTENSION).unwrap_or(true) {
                continue;
            }
            let id = path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
            let header = fs::read(&path)
                .map_err(CheckpointError::from)
                .and_then(|bytes| codec::decode_header(&id, &bytes));
            match header {
                Ok(header) => entries.push(header.metadata),
                Err(e) => warn!(%id, error = %e, "Skipping corrupt checkpoint blob"),
            }
        }
        info!(count = entries.len(), "Rebuilt checkpoint index from blobs");
        Ok(entries)
    }

    fn set_index(&mut self, mut entries: Vec<Checkpoint>) {
        entries.sort_by_key(|cp| cp.sequence);
        self.next_sequence = entries.last().map(|cp| cp.sequence + 1).unwrap_or(1);
        self.index = entries;
    }

    fn save_index(&self) -> Result<(), CheckpointError> {
        debug!(count = self.index.len(), "save_index: called");
        let bytes = serde_json::to_vec_pretty(&self.index)?;
        write_atomic(&self.index_path(), &bytes)?;
        Ok(())
    }

    /// Add a file to the tracked set used when a request names no files
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.tracked.insert(path.into());
    }

    pub fn untrack(&mut self, path: &Path) -> bool {
        self.tracked.remove(path)
    }

    pub fn tracked_files(&self) -> Vec<PathBuf> {
        self.tracked.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Snapshot files and persist the checkpoint
    ///
    /// A request id that already has a checkpoint is a replay: nothing new is
    /// captured and the files are rolled back to that checkpoint instead.
    pub fn create_checkpoint(&mut self, request: CheckpointRequest) -> Result<CreateOutcome, CheckpointError> {
        debug!(description = %request.description, files = request.files.len(), request_id = ?request.request_id, "create_checkpoint: called");

        if let Some(request_id) = &request.request_id
            && let Some(existing) = self.index.iter().find(|cp| cp.request_id.as_ref() == Some(request_id))
        {
            let checkpoint_id = existing.checkpoint_id.clone();
            info!(%request_id, %checkpoint_id, "Replayed request, rolling back to existing checkpoint");
            let rollback = self.rollback(&CheckpointRef::Id(checkpoint_id.clone()), None);
            return Ok(CreateOutcome::Replayed { checkpoint_id, rollback });
        }

        let files = if request.files.is_empty() {
            debug!("create_checkpoint: no files given, using tracked set");
            self.tracked_files()
        } else {
            request.files.clone()
        };
        if files.is_empty() {
            return Err(CheckpointError::EmptySnapshot);
        }

        let mut snapshot = FileSnapshot::new();
        for path in &files {
            let content = fs::read_to_string(path).map_err(|source| CheckpointError::Capture {
                path: path.clone(),
                source,
            })?;
            snapshot.insert(path.to_string_lossy().into_owned(), content);
        }

        let checkpoint = Checkpoint {
            checkpoint_id: Uuid::now_v7().to_string(),
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            modified_files: snapshot.keys().cloned().collect(),
            content_hash: codec::content_hash(&snapshot),
            description: request.description,
            session_id: request.session_id,
            request_id: request.request_id,
            confidence: request.confidence,
        };

        let blob_path = self.blob_path(&checkpoint.checkpoint_id);
        let bytes = codec::encode(&checkpoint, &snapshot)?;
        write_atomic(&blob_path, &bytes)?;

        self.index.push(checkpoint.clone());
        if let Err(e) = self.save_index() {
            // Not recorded as usable unless the index lists it
            self.index.pop();
            let _ = fs::remove_file(&blob_path);
            return Err(e);
        }
        self.next_sequence += 1;
        self.cache.insert(checkpoint.checkpoint_id.clone(), snapshot);
        info!(id = %checkpoint.checkpoint_id, files = checkpoint.modified_files.len(), "Created checkpoint");

        let evicted = self.evict(&checkpoint.checkpoint_id)?;
        if !evicted.is_empty() {
            debug!(?evicted, "create_checkpoint: evicted");
        }
        Ok(CreateOutcome::Created(checkpoint))
    }

    /// Resolve a reference against the index sorted by recency
    pub fn resolve(&self, reference: &CheckpointRef) -> Option<&Checkpoint> {
        match reference {
            CheckpointRef::Latest => self.index.last(),
            CheckpointRef::Previous => self.index.iter().rev().nth(1),
            CheckpointRef::Id(id) => self.index.iter().find(|cp| &cp.checkpoint_id == id),
        }
    }

    fn snapshot(&mut self, id: &str) -> Result<&FileSnapshot, CheckpointError> {
        if !self.cache.contains_key(id) {
            debug!(%id, "snapshot: cold load from disk");
            let bytes = match fs::read(self.blob_path(id)) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(CheckpointError::NotFound { id: id.to_string() });
                }
                Err(e) => return Err(e.into()),
            };
            let (_, snapshot) = codec::decode(id, &bytes)?;
            self.cache.insert(id.to_string(), snapshot);
        }
        self.cache
            .get(id)
            .ok_or_else(|| CheckpointError::NotFound { id: id.to_string() })
    }

    /// Restore captured content; best-effort per file
    pub fn rollback(&mut self, reference: &CheckpointRef, files: Option<&[PathBuf]>) -> RollbackReport {
        debug!(%reference, ?files, "rollback: called");
        let Some(checkpoint_id) = self.resolve(reference).map(|cp| cp.checkpoint_id.clone()) else {
            warn!(%reference, "Rollback target not found");
            return RollbackReport::not_found(reference);
        };

        let snapshot = match self.snapshot(&checkpoint_id) {
            Ok(snapshot) => snapshot.clone(),
            Err(e) => {
                warn!(%checkpoint_id, error = %e, "Rollback could not load snapshot");
                return RollbackReport {
                    checkpoint_id: Some(checkpoint_id),
                    not_found: e.is_not_found(),
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let targets: Vec<String> = match files {
            Some(files) => files.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
            None => snapshot.keys().cloned().collect(),
        };

        let mut report = RollbackReport {
            checkpoint_id: Some(checkpoint_id.clone()),
            ..Default::default()
        };
        for key in targets {
            let Some(content) = snapshot.get(&key) else {
                report.failed_files.push(RestoreFailure {
                    path: key,
                    message: "not captured in checkpoint".to_string(),
                });
                continue;
            };
            match restore_file(Path::new(&key), content) {
                Ok(()) => report.restored_files.push(key),
                Err(e) => {
                    warn!(path = %key, error = %e, "Failed to restore file");
                    report.failed_files.push(RestoreFailure {
                        path: key,
                        message: e.to_string(),
                    });
                }
            }
        }
        report.success = report.failed_files.is_empty();
        info!(
            %checkpoint_id,
            restored = report.restored_files.len(),
            failed = report.failed_files.len(),
            "Rollback finished"
        );
        report
    }

    /// Checkpoints, newest first
    pub fn list_checkpoints(&self) -> Vec<Checkpoint> {
        self.index.iter().rev().cloned().collect()
    }

    fn remove_entry(&mut self, id: &str) -> Result<(), CheckpointError> {
        self.index.retain(|cp| cp.checkpoint_id != id);
        self.cache.remove(id);
        match fs::remove_file(self.blob_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete one checkpoint; returns false when the id is unknown
    pub fn delete_checkpoint(&mut self, id: &str) -> Result<bool, CheckpointError> {
        debug!(%id, "delete_checkpoint: called");
        if !self.index.iter().any(|cp| cp.checkpoint_id == id) {
            return Ok(false);
        }
        self.remove_entry(id)?;
        self.save_index()?;
        info!(%id, "Deleted checkpoint");
        Ok(true)
    }

    /// Delete every checkpoint correlated with a session
    pub fn delete_session_checkpoints(&mut self, session_id: &str) -> Result<usize, CheckpointError> {
        debug!(%session_id, "delete_session_checkpoints: called");
        let ids: Vec<CheckpointId> = self
            .index
            .iter()
            .filter(|cp| cp.session_id.as_deref() == Some(session_id))
            .map(|cp| cp.checkpoint_id.clone())
            .collect();
        for id in &ids {
            self.remove_entry(id)?;
        }
        if !ids.is_empty() {
            self.save_index()?;
        }
        info!(%session_id, count = ids.len(), "Deleted session checkpoints");
        Ok(ids.len())
    }

    /// Content of one file as captured by a checkpoint
    pub fn get_file_content(&mut self, reference: &CheckpointRef, path: &Path) -> Result<String, CheckpointError> {
        let id = self
            .resolve(reference)
            .map(|cp| cp.checkpoint_id.clone())
            .ok_or_else(|| CheckpointError::NotFound {
                id: reference.to_string(),
            })?;
        let key = path.to_string_lossy().into_owned();
        self.snapshot(&id)?
            .get(&key)
            .cloned()
            .ok_or(CheckpointError::FileNotInCheckpoint { id, path: key })
    }

    /// Diff captured content against what is on disk now
    pub fn diff(&mut self, reference: &CheckpointRef, path: Option<&Path>) -> Result<DiffReport, CheckpointError> {
        debug!(%reference, ?path, "diff: called");
        let id = self
            .resolve(reference)
            .map(|cp| cp.checkpoint_id.clone())
            .ok_or_else(|| CheckpointError::NotFound {
                id: reference.to_string(),
            })?;
        let snapshot = self.snapshot(&id)?.clone();

        let keys: Vec<String> = match path {
            Some(p) => {
                let key = p.to_string_lossy().into_owned();
                if !snapshot.contains_key(&key) {
                    return Err(CheckpointError::FileNotInCheckpoint { id, path: key });
                }
                vec![key]
            }
            None => snapshot.keys().cloned().collect(),
        };

        let files = keys
            .into_iter()
            .map(|key| {
                // A deleted or unreadable file diffs against empty content
                let current = fs::read_to_string(&key).unwrap_or_default();
                let text = unified_diff(
                    &snapshot[&key],
                    &current,
                    &format!("checkpoint/{}", key),
                    &format!("current/{}", key),
                    DEFAULT_CONTEXT,
                );
                FileDiff { path: key, text }
            })
            .collect();
        Ok(DiffReport {
            checkpoint_id: id,
            files,
        })
    }

    /// Retention score: explicit confidence plus normalized recency
    fn score(&self, position: usize) -> f64 {
        let recency = if self.index.len() <= 1 {
            1.0
        } else {
            position as f64 / (self.index.len() - 1) as f64
        };
        self.index[position].confidence + recency
    }

    /// Evict lowest-scoring checkpoints until within the retention limit
    ///
    /// `keep` (the checkpoint just created) is never a candidate.
    fn evict(&mut self, keep: &str) -> Result<Vec<CheckpointId>, CheckpointError> {
        let mut evicted = Vec::new();
        while self.index.len() > self.options.max_checkpoints {
            let victim = (0..self.index.len())
                .filter(|pos| self.index[*pos].checkpoint_id != keep)
                .min_by(|a, b| self.score(*a).total_cmp(&self.score(*b)).then(a.cmp(b)))
                .map(|pos| self.index[pos].checkpoint_id.clone());
            let Some(id) = victim else { break };
            debug!(%id, "evict: removing");
            self.remove_entry(&id)?;
            evicted.push(id);
        }
        if !evicted.is_empty() {
            self.save_index()?;
            info!(count = evicted.len(), "Evicted checkpoints over retention limit");
        }
        Ok(evicted)
    }
}

impl Checkpointer for CheckpointStore {
    fn create_checkpoint(&mut self, request: CheckpointRequest) -> Result<CreateOutcome, CheckpointError> {
        CheckpointStore::create_checkpoint(self, request)
    }

    fn rollback(&mut self, reference: &CheckpointRef, files: Option<&[PathBuf]>) -> RollbackReport {
        CheckpointStore::rollback(self, reference, files)
    }

    fn list_checkpoints(&self) -> Vec<Checkpoint> {
        CheckpointStore::list_checkpoints(self)
    }
}

fn restore_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
