//! Collection schemas
//!
//! A collection's schema is defined once at startup and consulted by every
//! write and search. Writes against an undefined collection fail fast.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, VaultError};

/// Per-collection schema: field roles and bloom sizing
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Fields whose values must be unique within a shard
    pub unique: Vec<String>,

    /// Fields with a maintained secondary index, not necessarily unique
    pub indexed: Vec<String>,

    /// Fields open to prefix search (in addition to unique/indexed ones)
    pub search_prefix: Vec<String>,

    /// Expected records per shard, sizes the bloom filter
    pub bloom_expected_count: usize,

    /// Target bloom false-positive rate
    pub bloom_false_positive_rate: f64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            unique: Vec::new(),
            indexed: Vec::new(),
            search_prefix: Vec::new(),
            bloom_expected_count: 25_000_000,
            bloom_false_positive_rate: 0.008,
        }
    }
}

impl CollectionConfig {
    /// Fields that get a secondary index entry: unique then indexed, deduped
    pub fn index_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::with_capacity(self.unique.len() + self.indexed.len());
        for field in self.unique.iter().chain(self.indexed.iter()) {
            if !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }
        fields
    }

    /// Whether prefix search is allowed on a field.
    ///
    /// Opt-in: unique, indexed, and search_prefix fields only. Everything
    /// else fails closed to keep uncontrolled fields from triggering
    /// full-namespace scans.
    pub fn is_searchable(&self, field: &str) -> bool {
        self.search_prefix.iter().any(|f| f == field)
            || self.unique.iter().any(|f| f == field)
            || self.indexed.iter().any(|f| f == field)
    }

    /// Whether inserts maintain an index entry for this field
    pub fn is_index_field(&self, field: &str) -> bool {
        self.unique.iter().any(|f| f == field) || self.indexed.iter().any(|f| f == field)
    }
}

/// Registry of collection schemas, owned by the engine instance
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    configs: RwLock<HashMap<String, Arc<CollectionConfig>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a collection's schema
    pub fn define(&self, collection: impl Into<String>, config: CollectionConfig) {
        self.configs.write().insert(collection.into(), Arc::new(config));
    }

    /// Schema for a collection; errors if it was never defined
    pub fn get(&self, collection: &str) -> Result<Arc<CollectionConfig>> {
        self.configs
            .read()
            .get(collection)
            .cloned()
            .ok_or_else(|| VaultError::CollectionNotDefined(collection.to_string()))
    }
}
