//! # DayVault
//!
//! An embedded, time-sharded, encrypted record store with:
//! - One encrypted storage shard per collection per calendar day
//! - Bloom-filter dedup screening backed by authoritative index lookups
//! - Secondary indexes with opt-in prefix search
//! - Background offload of large embedded media payloads
//! - A migration path off the prior JSON-file storage format
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Record Engine                           │
//! │        (insert / get / search / migrate / close)             │
//! └─────────┬──────────────────────────────────┬────────────────┘
//!           │                                  │
//! ┌─────────▼─────────┐              ┌─────────▼─────────┐
//! │   Shard Manager   │              │    Media Pool      │
//! │ (cache + retry +  │              │ (decode → blob →   │
//! │   bloom warm-up)  │              │   patch record)    │
//! └─────────┬─────────┘              └─────────┬─────────┘
//!           │                                  │
//!           ▼                                  ▼
//! ┌───────────────────────────────┐   ┌───────────────────┐
//! │  Shard Store (per day)        │   │    uploads/        │
//! │  [len][crc][sealed frame]...  │   │  (decoded blobs)   │
//! └───────────────────────────────┘   └───────────────────┘
//! ```
//!
//! Every shard frame is sealed under a key derived from the calendar day and
//! a master secret, so a shard reopens across restarts without any key
//! material on disk.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod crypto;
pub mod bloom;
pub mod record;
pub mod schema;
pub mod shard;
pub mod media;
pub mod migrate;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, VaultError};
pub use config::{SyncStrategy, VaultConfig};
pub use engine::{InsertOutcome, Vault};
pub use migrate::MigrationReport;
pub use record::Record;
pub use schema::CollectionConfig;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of DayVault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
