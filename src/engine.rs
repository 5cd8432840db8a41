//! Engine Module
//!
//! The record engine that coordinates all components.
//!
//! ## Responsibilities
//! - Resolve operations to the right day's shard
//! - Enforce the dedup protocol (bloom screen + authoritative index lookup)
//! - Maintain primary and secondary-index entries
//! - Detach media payloads and hand them to the background pool
//! - Drive legacy migration and graceful shutdown

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::media::{MediaJob, MediaPool};
use crate::migrate::{self, MigrationReport};
use crate::record::{index_string, Record};
use crate::schema::{CollectionConfig, SchemaRegistry};
use crate::shard::{index_key, primary_key, ShardId, ShardManager};

/// Result of an insert attempt.
///
/// A duplicate is a structured outcome, not an error: callers implementing
/// update-as-reinsert match on it and merge against `existing`.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The record was written
    Inserted { id: String },

    /// A unique field collided; nothing was written
    Duplicate {
        field: String,
        value: String,
        existing: Record,
    },
}

impl InsertOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, InsertOutcome::Duplicate { .. })
    }
}

impl fmt::Display for InsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertOutcome::Inserted { id } => write!(f, "inserted {id}"),
            InsertOutcome::Duplicate { field, value, .. } => {
                write!(f, "Duplicate {field}: {value}")
            }
        }
    }
}

/// The record engine
///
/// ## Concurrency Model
///
/// - Shard-handle and bloom caches live in the `ShardManager` behind RwLocks
/// - Every per-shard operation serializes on that shard's store mutex;
///   operations on different shards run fully in parallel
/// - Insert holds one store-lock span from the dedup check through the last
///   index write, so a duplicate can never slip in between check and commit
///   on the same shard
/// - Lock order is store then bloom; the bloom mutex is only ever taken by a
///   thread already holding the same shard's store lock
pub struct Vault {
    /// Engine configuration
    config: VaultConfig,

    /// Per-collection schemas (internal RwLock)
    schemas: SchemaRegistry,

    /// Shard store and bloom caches (internal RwLocks)
    shards: Arc<ShardManager>,

    /// Background media offload workers
    media: MediaPool,

    /// Shards whose legacy migration already ran this process
    migrated: Mutex<HashSet<String>>,
}

impl Vault {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const UPLOADS_DIR: &'static str = "uploads";

    /// Open or create a vault with the given config
    ///
    /// On startup:
    /// 1. Create the root directory
    /// 2. Start the shard manager (shards themselves open lazily)
    /// 3. Start the media worker pool
    pub fn open(config: VaultConfig) -> Result<Self> {
        // Step 1: Create root directory if it doesn't exist
        std::fs::create_dir_all(&config.root_dir)?;

        // Step 2: Shard manager owns every store/bloom cache
        let shards = Arc::new(ShardManager::new(config.clone()));

        // Step 3: Media pool writes blobs under {root}/uploads
        let uploads_dir = config.root_dir.join(Self::UPLOADS_DIR);
        let media = MediaPool::new(shards.clone(), uploads_dir, config.media_workers)?;

        info!(root = %config.root_dir.display(), "vault opened");

        Ok(Self {
            config,
            schemas: SchemaRegistry::new(),
            shards,
            media,
            migrated: Mutex::new(HashSet::new()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified root directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = VaultConfig::builder().root_dir(path).build();
        Self::open(config)
    }

    /// Register a collection's schema.
    ///
    /// Must run before any insert or search against that collection.
    pub fn define_collection(&self, collection: impl Into<String>, config: CollectionConfig) {
        self.schemas.define(collection, config);
    }

    /// Insert a record into today's shard.
    ///
    /// Steps:
    /// 1. Validate: collection defined, record id present
    /// 2. Stamp `hash`, `_insertedAt`, `_date`
    /// 3. Dedup every populated unique field (bloom screen, then
    ///    authoritative index lookup on a possible hit)
    /// 4. Detach media payloads, null their fields
    /// 5. Write the primary entry, then one index entry per populated
    ///    unique/indexed field
    /// 6. Register the checked unique values in the bloom filter
    /// 7. Queue detached media for background offload
    pub fn insert(&self, collection: &str, record: Record) -> Result<InsertOutcome> {
        let cfg = self.schemas.get(collection)?;

        let Some(id) = record.id().map(str::to_string) else {
            return Err(VaultError::Validation(
                "record id is required and must be a non-empty string".to_string(),
            ));
        };

        let shard = ShardId::today(collection);
        let mut record = record;
        record.set("hash", Value::String(crypto::sha256_hex(id.as_bytes())));
        record.set(
            "_insertedAt",
            Value::Number(Utc::now().timestamp_millis().into()),
        );
        record.set("_date", Value::String(shard.date_string()));

        // Bloom resolution first: on a cold shard this warms from the index,
        // taking the store lock internally
        let bloom = self.shards.bloom_for(&shard, &cfg)?;
        let store = self.shards.get_store(&shard)?;

        let mut store = store.lock();

        // Dedup pass over populated unique fields; absent and null values
        // never participate
        let mut checked_values: Vec<String> = Vec::new();
        for field in &cfg.unique {
            let value_str = match record.get(field) {
                None | Some(Value::Null) => continue,
                Some(v) => match index_string(v) {
                    Some(s) => s,
                    None => continue,
                },
            };

            if bloom.lock().might_contain(&value_str) {
                if let Some(existing) = lookup_by_field(&store, field, &value_str)? {
                    debug!(
                        shard = %shard,
                        field = %field,
                        value = %value_str,
                        "duplicate insert rejected"
                    );
                    return Ok(InsertOutcome::Duplicate {
                        field: field.clone(),
                        value: value_str,
                        existing,
                    });
                }
                // Bloom false positive: the index is authoritative
            }
            checked_values.push(value_str);
        }

        let detached = record.detach_media();

        store.put(&primary_key(&id), &serde_json::to_vec(&record)?)?;

        for field in cfg.index_fields() {
            // The primary entry doubles as the id field's index entry
            if field == "id" {
                continue;
            }
            let Some(value) = record.get(field) else {
                continue;
            };
            if let Some(value_str) = index_string(value) {
                store.put(&index_key(field, &value_str), id.as_bytes())?;
            }
        }

        // Bloom registration happens only after the primary write committed,
        // so a failure above cannot leave the filter claiming phantom values
        if !checked_values.is_empty() {
            let mut bloom = bloom.lock();
            for value in &checked_values {
                bloom.add(value);
            }
        }

        drop(store);

        if !detached.is_empty() {
            self.media.submit(MediaJob {
                shard,
                record_id: id.clone(),
                original: record,
                media: detached,
                index_fields: cfg.index_fields().iter().map(|f| f.to_string()).collect(),
            });
        }

        Ok(InsertOutcome::Inserted { id })
    }

    /// Point lookup through a field's secondary index
    pub fn get_by_field(
        &self,
        collection: &str,
        year: i32,
        month: u32,
        day: u32,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>> {
        let shard = ShardId::new(collection, year, month, day);
        let store = self.shards.get_store(&shard)?;
        let store = store.lock();
        lookup_by_field(&store, field, value)
    }

    /// Prefix search over a field's secondary index.
    ///
    /// Fails closed unless the field is declared unique, indexed, or
    /// prefix-searchable for the collection.
    pub fn search(
        &self,
        collection: &str,
        year: i32,
        month: u32,
        day: u32,
        field: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let cfg = self.schemas.get(collection)?;
        if !cfg.is_searchable(field) {
            return Err(VaultError::FieldNotSearchable {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }

        let shard = ShardId::new(collection, year, month, day);
        let store = self.shards.get_store(&shard)?;
        let store = store.lock();

        let mut records = Vec::new();

        // An id search scans the primary namespace, where the entries hold
        // the records themselves
        if field == "id" {
            for (_, bytes) in store.scan_prefix(&index_key(field, prefix), limit) {
                records.push(serde_json::from_slice(&bytes)?);
            }
            return Ok(records);
        }

        for (entry_key, id_bytes) in store.scan_prefix(&index_key(field, prefix), limit) {
            let record_id = String::from_utf8_lossy(&id_bytes);
            match store.get(&primary_key(&record_id)) {
                Some(bytes) => records.push(serde_json::from_slice(bytes)?),
                None => {
                    warn!(shard = %shard, index_entry = %entry_key, "index entry without a record");
                }
            }
        }
        Ok(records)
    }

    /// Every record in one day's shard, in id order
    pub fn get_day(
        &self,
        collection: &str,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<Vec<Record>> {
        let shard = ShardId::new(collection, year, month, day);
        let store = self.shards.get_store(&shard)?;
        let store = store.lock();

        let mut records = Vec::new();
        for (_, bytes) in store.scan_prefix("id:", usize::MAX) {
            records.push(serde_json::from_slice(&bytes)?);
        }
        Ok(records)
    }

    /// Every record across one calendar month.
    ///
    /// Days with no shard directory on disk are skipped rather than
    /// materialized.
    pub fn get_month(&self, collection: &str, year: i32, month: u32) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for day in 1..=days_in_month(year, month)? {
            let shard = ShardId::new(collection, year, month, day);
            if !self.shards.shard_dir_exists(&shard) {
                continue;
            }
            records.extend(self.get_day(collection, year, month, day)?);
        }
        Ok(records)
    }

    /// Point lookup by record id
    pub fn get_by_id(
        &self,
        collection: &str,
        year: i32,
        month: u32,
        day: u32,
        id: &str,
    ) -> Result<Option<Record>> {
        let shard = ShardId::new(collection, year, month, day);
        let store = self.shards.get_store(&shard)?;
        let store = store.lock();

        match store.get(&primary_key(id)) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    /// Migrate one day's legacy JSON file into the engine.
    ///
    /// Idempotent per (collection, day) within a process: repeat calls
    /// return an empty report. Every recovered record flows through
    /// [`Self::insert`] and lands in today's shard with fresh stamps,
    /// inheriting all dedup and indexing behavior. Corrupted files and
    /// chunks are logged and skipped.
    pub fn migrate_old_day(
        &self,
        collection: &str,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<MigrationReport> {
        let shard = ShardId::new(collection, year, month, day);
        let cache_key = shard.cache_key();

        if self.migrated.lock().contains(&cache_key) {
            debug!(shard = %shard, "legacy migration already ran, skipping");
            return Ok(MigrationReport::default());
        }

        let legacy_path = shard
            .dir(&self.config.root_dir)
            .join(migrate::LEGACY_FILE_NAME);
        let daily_key = crypto::derive_daily_key(year, month, day, &self.config.master_key);

        let mut report = MigrationReport::default();
        if let Some(legacy) = migrate::read_legacy_day(&legacy_path, &daily_key) {
            report.chunks_skipped = legacy.chunks_skipped;
            for record in legacy.records {
                match self.insert(collection, record) {
                    Ok(InsertOutcome::Inserted { .. }) => report.records_inserted += 1,
                    Ok(InsertOutcome::Duplicate { field, value, .. }) => {
                        debug!(shard = %shard, field = %field, value = %value, "migrated record already present");
                        report.duplicates_skipped += 1;
                    }
                    Err(e) => {
                        warn!(shard = %shard, error = %e, "failed to migrate record");
                        report.records_failed += 1;
                    }
                }
            }
            info!(
                shard = %shard,
                inserted = report.records_inserted,
                duplicates = report.duplicates_skipped,
                failed = report.records_failed,
                chunks_skipped = report.chunks_skipped,
                "legacy migration finished"
            );
        }

        self.migrated.lock().insert(cache_key);
        Ok(report)
    }

    /// Close the vault gracefully.
    ///
    /// Drains and joins the media pool (queued offloads finish first), then
    /// closes every open shard, swallowing individual close errors. Safe to
    /// call more than once and with nothing open.
    pub fn close(&self) {
        self.media.shutdown();
        self.shards.close_all();
        info!("vault closed");
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Media offload fields persisted successfully
    pub fn media_completed(&self) -> u64 {
        self.media.completed()
    }

    /// Media offload fields that failed and stayed in placeholder state
    pub fn media_failed(&self) -> u64 {
        self.media.failed()
    }

    /// Number of shard stores currently open
    pub fn open_shard_count(&self) -> usize {
        self.shards.open_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }
}

/// Authoritative index lookup: field value to owning record.
///
/// The `id` field resolves directly through the primary namespace; any other
/// field goes through its index entry. An index entry pointing at a missing
/// record reads as absent.
fn lookup_by_field(
    store: &crate::shard::ShardStore,
    field: &str,
    value: &str,
) -> Result<Option<Record>> {
    if field == "id" {
        return match store.get(&primary_key(value)) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        };
    }

    let Some(id_bytes) = store.get(&index_key(field, value)) else {
        return Ok(None);
    };
    let record_id = String::from_utf8_lossy(id_bytes).into_owned();
    match store.get(&primary_key(&record_id)) {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        None => Ok(None),
    }
}

/// Number of days in a calendar month
fn days_in_month(year: i32, month: u32) -> Result<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| VaultError::Validation(format!("invalid month: {year}-{month}")))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| VaultError::Validation(format!("invalid month: {year}-{month}")))?;
    Ok(next.signed_duration_since(first).num_days() as u32)
}
