//! Shard Manager
//!
//! Owns the lifecycle of every open shard: directory creation, daily key
//! derivation, retried store opening, handle caching, and per-shard bloom
//! filters warmed from persisted index entries.
//!
//! ## Concurrency:
//! - `stores` / `blooms`: RwLock-protected caches (many concurrent readers,
//!   exclusive writer)
//! - Each cached entry is an `Arc<Mutex<_>>`, so operations on different
//!   shards never contend while operations on one shard serialize at its lock
//! - All methods use `&self`

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tracing::{debug, warn};

use crate::bloom::BloomFilter;
use crate::config::VaultConfig;
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::record::{index_string, Record};
use crate::schema::CollectionConfig;

use super::store::SHARD_FILE_NAME;
use super::{index_prefix, primary_key, ShardId, ShardStore};

/// Manages open shard stores and their bloom filters
pub struct ShardManager {
    config: VaultConfig,

    /// Open shard stores, keyed by `collection:YYYY:MM:DD`
    stores: RwLock<HashMap<String, Arc<Mutex<ShardStore>>>>,

    /// Warmed bloom filters, same keying as `stores`
    blooms: RwLock<HashMap<String, Arc<Mutex<BloomFilter>>>>,
}

impl ShardManager {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            stores: RwLock::new(HashMap::new()),
            blooms: RwLock::new(HashMap::new()),
        }
    }

    /// Get (or open) the store for a shard.
    ///
    /// On first touch:
    /// 1. Create the shard directory hierarchy
    /// 2. Derive the day's key from the master secret
    /// 3. Open the store, retrying with backoff + jitter on transient errors
    /// 4. Cache the handle
    pub fn get_store(&self, id: &ShardId) -> Result<Arc<Mutex<ShardStore>>> {
        let cache_key = id.cache_key();

        if let Some(store) = self.stores.read().get(&cache_key) {
            return Ok(store.clone());
        }

        let dir = id.dir(&self.config.root_dir);
        fs::create_dir_all(&dir)?;

        let key = crypto::derive_daily_key(id.year, id.month, id.day, &self.config.master_key);
        let path = dir.join(SHARD_FILE_NAME);

        let mut last_err: Option<VaultError> = None;
        let mut opened: Option<ShardStore> = None;

        for attempt in 0..self.config.open_retry_limit {
            match ShardStore::open(&path, key, self.config.sync_strategy) {
                Ok(store) => {
                    opened = Some(store);
                    break;
                }
                Err(e) => {
                    warn!(
                        shard = %id,
                        attempt = attempt + 1,
                        error = %e,
                        "shard open failed, retrying"
                    );
                    last_err = Some(e);
                    if attempt + 1 < self.config.open_retry_limit {
                        thread::sleep(self.retry_delay(attempt));
                    }
                }
            }
        }

        let Some(store) = opened else {
            return Err(VaultError::ShardOpen {
                path: path.display().to_string(),
                attempts: self.config.open_retry_limit,
                reason: last_err
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no attempts made".to_string()),
            });
        };

        debug!(shard = %id, keys = store.len(), "shard store opened");

        // First insert wins; a racing open's handle drops here unwritten
        let mut stores = self.stores.write();
        let entry = stores
            .entry(cache_key)
            .or_insert_with(|| Arc::new(Mutex::new(store)));
        Ok(entry.clone())
    }

    /// Get (or build) the bloom filter for a shard.
    ///
    /// A new filter is warmed from the persisted index: every unique-field
    /// entry is walked, its record re-fetched by id, and the field's current
    /// value re-added. Dedup correctness thus survives process restarts.
    pub fn bloom_for(
        &self,
        id: &ShardId,
        cfg: &CollectionConfig,
    ) -> Result<Arc<Mutex<BloomFilter>>> {
        let cache_key = id.cache_key();

        if let Some(bloom) = self.blooms.read().get(&cache_key) {
            return Ok(bloom.clone());
        }

        let mut bloom = BloomFilter::new(cfg.bloom_expected_count, cfg.bloom_false_positive_rate);

        let store = self.get_store(id)?;
        {
            let store = store.lock();
            for field in &cfg.unique {
                let mut warmed = 0u64;
                for (entry_key, value_bytes) in store.scan_prefix(&index_prefix(field), usize::MAX)
                {
                    // Under `id:` the entry holds the record itself; under any
                    // other field it holds the owning record's id
                    let parsed = if field == "id" {
                        serde_json::from_slice::<Record>(&value_bytes)
                    } else {
                        let record_id = String::from_utf8_lossy(&value_bytes);
                        match store.get(&primary_key(&record_id)) {
                            Some(bytes) => serde_json::from_slice::<Record>(bytes),
                            None => continue,
                        }
                    };
                    let Ok(record) = parsed else {
                        warn!(shard = %id, entry = %entry_key, "skipping unreadable record during bloom warm-up");
                        continue;
                    };
                    if let Some(value) = record.get(field).and_then(index_string) {
                        bloom.add(&value);
                        warmed += 1;
                    }
                }
                debug!(shard = %id, field = %field, warmed, "bloom warm-up pass");
            }
        }

        let mut blooms = self.blooms.write();
        let entry = blooms
            .entry(cache_key)
            .or_insert_with(|| Arc::new(Mutex::new(bloom)));
        Ok(entry.clone())
    }

    /// Whether a shard has ever been materialized on disk
    pub fn shard_dir_exists(&self, id: &ShardId) -> bool {
        id.dir(&self.config.root_dir).is_dir()
    }

    /// Number of open shard stores
    pub fn open_count(&self) -> usize {
        self.stores.read().len()
    }

    /// Close every cached store and drop all caches.
    ///
    /// Individual close failures are logged and swallowed. Safe to call more
    /// than once and with nothing open.
    pub fn close_all(&self) {
        let stores: Vec<(String, Arc<Mutex<ShardStore>>)> =
            self.stores.write().drain().collect();
        for (cache_key, store) in stores {
            if let Err(e) = store.lock().close() {
                warn!(shard = %cache_key, error = %e, "error closing shard store");
            }
        }
        self.blooms.write().clear();
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Backoff for one failed attempt: base + attempt * step + random jitter
    fn retry_delay(&self, attempt: u32) -> Duration {
        let mut delay =
            self.config.open_retry_base_delay_ms + u64::from(attempt) * self.config.open_retry_step_ms;
        if self.config.open_retry_jitter_ms > 0 {
            delay += rand::thread_rng().gen_range(0..self.config.open_retry_jitter_ms);
        }
        Duration::from_millis(delay)
    }
}
