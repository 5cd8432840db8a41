//! Configuration for DayVault
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a DayVault instance
#[derive(Debug, Clone)]
pub struct VaultConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (shards, media blobs)
    /// Internal structure:
    ///   {root_dir}/
    ///     ├── uploads/                         (decoded media blobs)
    ///     └── {collection}/{YYYY}/{MM}/{DD}/
    ///           └── shard.dvl                  (encrypted shard store)
    pub root_dir: PathBuf,

    /// Sync strategy: how often to fsync shard frames
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Crypto Configuration
    // -------------------------------------------------------------------------
    /// Master secret for per-day key derivation. Rotating it orphans
    /// previously written shards unless they are re-encrypted out of band.
    pub master_key: String,

    // -------------------------------------------------------------------------
    // Shard Open Retry Configuration
    // -------------------------------------------------------------------------
    /// Max attempts to open a shard store under file-lock contention
    pub open_retry_limit: u32,

    /// Base delay before the first retry (milliseconds)
    pub open_retry_base_delay_ms: u64,

    /// Additional delay added per attempt (milliseconds)
    pub open_retry_step_ms: u64,

    /// Upper bound on random jitter added per attempt (milliseconds)
    pub open_retry_jitter_ms: u64,

    // -------------------------------------------------------------------------
    // Media Configuration
    // -------------------------------------------------------------------------
    /// Number of background media offload workers
    pub media_workers: usize,
}

/// Shard frame sync strategy
#[derive(Debug, Clone, Copy)]
pub enum SyncStrategy {
    /// fsync after every frame (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced frames (balanced durability/performance)
    EveryNFrames { count: usize },
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./dayvault_data"),
            sync_strategy: SyncStrategy::EveryWrite,
            master_key: "fallback-static-key-2025-uzor-eternal".to_string(),
            open_retry_limit: 15,
            open_retry_base_delay_ms: 40,
            open_retry_step_ms: 20,
            open_retry_jitter_ms: 25,
            media_workers: 2,
        }
    }
}

impl VaultConfig {
    /// Create a new config builder
    pub fn builder() -> VaultConfigBuilder {
        VaultConfigBuilder::default()
    }
}

/// Builder for VaultConfig
#[derive(Default)]
pub struct VaultConfigBuilder {
    config: VaultConfig,
}

impl VaultConfigBuilder {
    /// Set the root directory (root for all storage)
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Set the frame sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the master secret for daily key derivation
    pub fn master_key(mut self, key: impl Into<String>) -> Self {
        self.config.master_key = key.into();
        self
    }

    /// Set the maximum number of shard open attempts
    pub fn open_retry_limit(mut self, limit: u32) -> Self {
        self.config.open_retry_limit = limit;
        self
    }

    /// Set the base retry delay (in milliseconds)
    pub fn open_retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.open_retry_base_delay_ms = ms;
        self
    }

    /// Set the per-attempt retry delay step (in milliseconds)
    pub fn open_retry_step_ms(mut self, ms: u64) -> Self {
        self.config.open_retry_step_ms = ms;
        self
    }

    /// Set the retry jitter bound (in milliseconds)
    pub fn open_retry_jitter_ms(mut self, ms: u64) -> Self {
        self.config.open_retry_jitter_ms = ms;
        self
    }

    /// Set the number of media offload workers
    pub fn media_workers(mut self, count: usize) -> Self {
        self.config.media_workers = count;
        self
    }

    pub fn build(self) -> VaultConfig {
        self.config
    }
}
