//! Legacy migration
//!
//! Reads the prior JSON-file storage format so old days can be folded back
//! into the engine. One file per day directory:
//!
//! ```text
//! db.json = { "records": [ chunk, chunk, ... ] }
//! ```
//!
//! Each chunk is the base64 encoding of a sealed (that day's derived key)
//! JSON array of records. Migration is best-effort recovery: a corrupted
//! file yields nothing, a corrupted chunk is skipped without touching its
//! siblings, and nothing in this module raises to the caller.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::crypto::{self, DailyKey};
use crate::error::{Result, VaultError};
use crate::record::Record;

/// File name of the legacy store inside a shard directory
pub const LEGACY_FILE_NAME: &str = "db.json";

/// Summary of one migration run
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Records re-inserted into the engine
    pub records_inserted: u64,

    /// Records skipped because a unique field already existed
    pub duplicates_skipped: u64,

    /// Records whose re-insert failed (logged and left behind)
    pub records_failed: u64,

    /// Chunks that could not be decoded and were skipped whole
    pub chunks_skipped: u64,
}

/// Everything readable from one legacy day file
#[derive(Debug)]
pub struct LegacyDay {
    /// Records recovered from every readable chunk, in file order
    pub records: Vec<Record>,

    /// Chunks dropped as unreadable
    pub chunks_skipped: u64,
}

#[derive(Deserialize)]
struct LegacyFile {
    #[serde(default)]
    records: Vec<String>,
}

/// Read one day's legacy file.
///
/// `None` means there is nothing to migrate: the file is missing or
/// unreadable as a whole (logged, never raised).
pub fn read_legacy_day(path: &Path, key: &DailyKey) -> Option<LegacyDay> {
    if !path.exists() {
        debug!(path = %path.display(), "no legacy file");
        return None;
    }

    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "legacy file unreadable, skipping");
            return None;
        }
    };

    let file: LegacyFile = match serde_json::from_slice(&raw) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "legacy file corrupted, skipping");
            return None;
        }
    };

    let mut records = Vec::new();
    let mut chunks_skipped = 0u64;
    for (i, chunk) in file.records.iter().enumerate() {
        match decode_chunk(chunk, key) {
            Ok(mut chunk_records) => records.append(&mut chunk_records),
            Err(e) => {
                warn!(path = %path.display(), chunk = i, error = %e, "skipping corrupted legacy chunk");
                chunks_skipped += 1;
            }
        }
    }

    Some(LegacyDay {
        records,
        chunks_skipped,
    })
}

/// Decode one chunk: base64, open under the day's key, parse the array
fn decode_chunk(chunk: &str, key: &DailyKey) -> Result<Vec<Record>> {
    let sealed = BASE64
        .decode(chunk.as_bytes())
        .map_err(|e| VaultError::Migration(format!("chunk is not valid base64: {e}")))?;
    let plain = crypto::open_sealed(key, &sealed)
        .map_err(|e| VaultError::Migration(format!("chunk failed authenticated decryption: {e}")))?;
    serde_json::from_slice(&plain)
        .map_err(|e| VaultError::Migration(format!("chunk is not a record array: {e}")))
}
