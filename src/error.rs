//! Error types for DayVault
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

/// Unified error type for DayVault operations
#[derive(Debug, Error)]
pub enum VaultError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Collection not defined: {0}")]
    CollectionNotDefined(String),

    #[error("Field not searchable for collection {collection}: {field}")]
    FieldNotSearchable { collection: String, field: String },

    // -------------------------------------------------------------------------
    // Shard Errors
    // -------------------------------------------------------------------------
    #[error("Failed to open shard at {path} after {attempts} attempts: {reason}")]
    ShardOpen {
        path: String,
        attempts: u32,
        reason: String,
    },

    #[error("Shard corruption detected: {0}")]
    ShardCorruption(String),

    // -------------------------------------------------------------------------
    // Crypto Errors
    // -------------------------------------------------------------------------
    #[error("Crypto error: {0}")]
    Crypto(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Migration Errors
    // -------------------------------------------------------------------------
    #[error("Migration error: {0}")]
    Migration(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
