//! Encrypted shard store
//!
//! Append-only, per-shard key-value file. Every mutation is sealed under the
//! shard's daily key and framed with a CRC so torn tail writes are detected
//! before any decryption is attempted.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Header: MAGIC (4) │ VERSION (2)      │
//! ├──────────────────────────────────────┤
//! │ Frame 1                              │
//! │ ┌─────────┬─────────┬──────────────┐ │
//! │ │ Len (4) │ CRC (4) │ Sealed bytes │ │
//! │ └─────────┴─────────┴──────────────┘ │
//! ├──────────────────────────────────────┤
//! │ Frame 2 ...                          │
//! └──────────────────────────────────────┘
//! ```
//!
//! `Sealed bytes` is the authenticated encryption of one bincode-encoded
//! [`LogOp`]. The CRC covers the sealed bytes. On open the file is scanned
//! frame by frame into an ordered in-memory map; an invalid tail is
//! truncated, while a CRC-valid frame that fails authenticated decryption is
//! a hard error (a wrong key must not present an empty store).

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SyncStrategy;
use crate::crypto::{self, DailyKey};
use crate::error::{Result, VaultError};

/// Magic bytes identifying a shard store file
pub const MAGIC: &[u8; 4] = b"DVLT";

/// Current shard file format version
pub const VERSION: u16 = 1;

/// Header size: magic + version
pub const HEADER_SIZE: usize = 6;

/// Per-frame prefix size: length + CRC
const FRAME_PREFIX_SIZE: usize = 8;

/// File name of the store inside a shard directory
pub const SHARD_FILE_NAME: &str = "shard.dvl";

/// One logged mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
enum LogOp {
    /// Put a key-value pair
    Put { key: String, value: Vec<u8> },

    /// Remove a key
    Remove { key: String },
}

/// An open shard store: append-only file plus the live in-memory map
pub struct ShardStore {
    /// Store file path
    path: PathBuf,
    /// Append handle, positioned at end of the last valid frame
    file: File,
    /// Daily key sealing every frame
    key: DailyKey,
    /// Live state rebuilt from the frame scan; ordered for prefix scans
    live: BTreeMap<String, Vec<u8>>,
    /// fsync policy
    sync_strategy: SyncStrategy,
    /// Frames appended since the last fsync
    unsynced_frames: usize,
}

impl ShardStore {
    /// Open (or create) the store file and rebuild the live map.
    ///
    /// Recovery rules:
    /// 1. A missing or empty file gets a fresh header.
    /// 2. Frames are replayed in order into the live map.
    /// 3. A torn tail (short frame or CRC mismatch) truncates the file back
    ///    to the last valid frame.
    /// 4. A CRC-valid frame failing authenticated decryption aborts the open.
    pub fn open(path: &Path, key: DailyKey, sync_strategy: SyncStrategy) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        if buf.len() < HEADER_SIZE {
            // New file, or one that died mid-header
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(MAGIC)?;
            file.write_all(&VERSION.to_le_bytes())?;
            file.sync_data()?;

            return Ok(Self {
                path: path.to_path_buf(),
                file,
                key,
                live: BTreeMap::new(),
                sync_strategy,
                unsynced_frames: 0,
            });
        }

        if &buf[0..4] != MAGIC {
            return Err(VaultError::ShardCorruption(format!(
                "bad magic in {}",
                path.display()
            )));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != VERSION {
            return Err(VaultError::ShardCorruption(format!(
                "unsupported shard version {} in {}",
                version,
                path.display()
            )));
        }

        let mut live = BTreeMap::new();
        let mut pos = HEADER_SIZE;
        let mut frames: u64 = 0;

        while pos < buf.len() {
            let Some(frame) = read_frame(&buf, pos) else {
                // Torn tail: drop everything from this offset on
                warn!(
                    path = %path.display(),
                    offset = pos,
                    "truncating torn shard tail"
                );
                break;
            };

            let plain = crypto::open_sealed(&key, frame.sealed)?;
            let op: LogOp = bincode::deserialize(&plain)
                .map_err(|e| VaultError::Serialization(e.to_string()))?;
            match op {
                LogOp::Put { key, value } => {
                    live.insert(key, value);
                }
                LogOp::Remove { key } => {
                    live.remove(&key);
                }
            }

            frames += 1;
            pos = frame.end;
        }

        if pos < buf.len() {
            file.set_len(pos as u64)?;
        }
        file.seek(SeekFrom::End(0))?;

        debug!(
            path = %path.display(),
            frames,
            keys = live.len(),
            "opened shard store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            key,
            live,
            sync_strategy,
            unsynced_frames: 0,
        })
    }

    /// Insert or overwrite a key
    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.append(&LogOp::Put {
            key: key.to_string(),
            value: value.to_vec(),
        })?;
        self.live.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    /// Remove a key; absent keys are a no-op (no frame written)
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if !self.live.contains_key(key) {
            return Ok(());
        }
        self.append(&LogOp::Remove {
            key: key.to_string(),
        })?;
        self.live.remove(key);
        Ok(())
    }

    /// Look up a key in the live map
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.live.get(key).map(|v| v.as_slice())
    }

    /// All entries whose key starts with `prefix`, in key order, capped at
    /// `limit`
    pub fn scan_prefix(&self, prefix: &str, limit: usize) -> Vec<(String, Vec<u8>)> {
        self.live
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force an fsync regardless of strategy
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced_frames = 0;
        Ok(())
    }

    /// Flush and sync; safe to call more than once
    pub fn close(&mut self) -> Result<()> {
        self.sync()
    }

    /// Seal, frame, and append one operation
    fn append(&mut self, op: &LogOp) -> Result<()> {
        let plain = bincode::serialize(op).map_err(|e| VaultError::Serialization(e.to_string()))?;
        let sealed = crypto::seal(&self.key, &plain)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&sealed);
        let crc = hasher.finalize();

        self.file.write_all(&(sealed.len() as u32).to_le_bytes())?;
        self.file.write_all(&crc.to_le_bytes())?;
        self.file.write_all(&sealed)?;

        self.unsynced_frames += 1;
        match self.sync_strategy {
            SyncStrategy::EveryWrite => self.sync()?,
            SyncStrategy::EveryNFrames { count } => {
                if self.unsynced_frames >= count {
                    self.sync()?;
                }
            }
        }
        Ok(())
    }
}

/// A validated frame within the open-time scan buffer
struct Frame<'a> {
    sealed: &'a [u8],
    /// Offset just past this frame
    end: usize,
}

/// Parse and CRC-check the frame at `pos`; `None` marks a torn tail
fn read_frame(buf: &[u8], pos: usize) -> Option<Frame<'_>> {
    if pos + FRAME_PREFIX_SIZE > buf.len() {
        return None;
    }
    let len = u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as usize;
    let crc = u32::from_le_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]]);

    let start = pos + FRAME_PREFIX_SIZE;
    let end = start.checked_add(len)?;
    if end > buf.len() {
        return None;
    }

    let sealed = &buf[start..end];
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(sealed);
    if hasher.finalize() != crc {
        return None;
    }

    Some(Frame { sealed, end })
}
