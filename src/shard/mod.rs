//! Time-sharded storage
//!
//! A shard is the physical storage unit for one collection on one calendar
//! day: an encrypted append-only store file plus a derived daily key and an
//! in-memory bloom filter. Shards are created lazily on first touch and
//! live until process shutdown.

pub mod manager;
pub mod store;

pub use manager::ShardManager;
pub use store::ShardStore;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};

/// Primary-entry key for a record id, `id:<id>`
pub fn primary_key(id: &str) -> String {
    format!("id:{id}")
}

/// Secondary-index key for a field value, `<field>:<value>`
pub fn index_key(field: &str, value: &str) -> String {
    format!("{field}:{value}")
}

/// Prefix covering one field's whole index namespace, `<field>:`
pub fn index_prefix(field: &str) -> String {
    format!("{field}:")
}

/// Identifies one shard: a collection plus a calendar day
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardId {
    pub collection: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl ShardId {
    pub fn new(collection: impl Into<String>, year: i32, month: u32, day: u32) -> Self {
        Self {
            collection: collection.into(),
            year,
            month,
            day,
        }
    }

    /// The shard for a collection on the current local calendar day
    pub fn today(collection: impl Into<String>) -> Self {
        let now = Local::now();
        Self::new(collection, now.year(), now.month(), now.day())
    }

    /// Cache key, `collection:YYYY:MM:DD`
    pub fn cache_key(&self) -> String {
        self.to_string()
    }

    /// Date string, `YYYY-MM-DD`, stamped onto records as `_date`
    pub fn date_string(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// On-disk directory, `{root}/{collection}/{YYYY}/{MM}/{DD}`
    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(&self.collection)
            .join(format!("{:04}", self.year))
            .join(format!("{:02}", self.month))
            .join(format!("{:02}", self.day))
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:04}:{:02}:{:02}",
            self.collection, self.year, self.month, self.day
        )
    }
}
