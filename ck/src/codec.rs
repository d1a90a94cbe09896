//! On-disk encoding for checkpoint blobs
//!
//! A `.ckpt` file is one JSON header line followed by the gzip-compressed
//! JSON snapshot:
//!
//! ```text
//! {"metadata":{...},"blob_sha256":"..."}\n
//! <gzip bytes>
//! ```
//!
//! The header alone is enough to rebuild the index, so a corrupt body only
//! surfaces when the snapshot content is actually needed.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use tracing::debug;

use crate::error::CheckpointError;
use crate::model::{Checkpoint, FileSnapshot};

/// Header line of a blob file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHeader {
    pub metadata: Checkpoint,
    /// SHA-256 of the compressed body
    pub blob_sha256: String,
}

/// Hash over every captured path and content, in path order
pub fn content_hash(snapshot: &FileSnapshot) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in snapshot {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Encode metadata and snapshot into blob-file bytes
pub fn encode(metadata: &Checkpoint, snapshot: &FileSnapshot) -> Result<Vec<u8>, CheckpointError> {
    debug!(id = %metadata.checkpoint_id, files = snapshot.len(), "encode: called");
    let json = serde_json::to_vec(snapshot)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let body = encoder.finish()?;

    let header = BlobHeader {
        metadata: metadata.clone(),
        blob_sha256: sha256_hex(&body),
    };
    let mut out = serde_json::to_vec(&header)?;
    out.push(b'\n');
    out.extend_from_slice(&body);
    debug!(raw = json.len(), compressed = body.len(), "encode: done");
    Ok(out)
}

fn split(id: &str, bytes: &[u8]) -> Result<(BlobHeader, usize), CheckpointError> {
    let newline = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| CheckpointError::Corrupt {
            id: id.to_string(),
            reason: "missing header line".to_string(),
        })?;
    let header: BlobHeader = serde_json::from_slice(&bytes[..newline]).map_err(|e| CheckpointError::Corrupt {
        id: id.to_string(),
        reason: format!("unreadable header: {}", e),
    })?;
    Ok((header, newline + 1))
}

/// Decode only the header (used during index reconstruction)
pub fn decode_header(id: &str, bytes: &[u8]) -> Result<BlobHeader, CheckpointError> {
    split(id, bytes).map(|(header, _)| header)
}

/// Decode header and snapshot, verifying the body digest
pub fn decode(id: &str, bytes: &[u8]) -> Result<(BlobHeader, FileSnapshot), CheckpointError> {
    debug!(%id, len = bytes.len(), "decode: called");
    let (header, offset) = split(id, bytes)?;
    let body = &bytes[offset..];

    let actual = sha256_hex(body);
    if actual != header.blob_sha256 {
        debug!(%id, expected = %header.blob_sha256, %actual, "decode: digest mismatch");
        return Err(CheckpointError::Corrupt {
            id: id.to_string(),
            reason: "body digest mismatch".to_string(),
        });
    }

    let mut json = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut json)
        .map_err(|e| CheckpointError::Corrupt {
            id: id.to_string(),
            reason: format!("decompression failed: {}", e),
        })?;
    let snapshot: FileSnapshot = serde_json::from_slice(&json).map_err(|e| CheckpointError::Corrupt {
        id: id.to_string(),
        reason: format!("unreadable snapshot: {}", e),
    })?;
    Ok((header, snapshot))
}
