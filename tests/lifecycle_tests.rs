//! Tests for vault lifecycle
//!
//! These tests verify:
//! - Open creates the root hierarchy
//! - Close is idempotent, drains media, and closes every shard
//! - The engine stays usable for reads after close
//! - Shard handles are cached per (collection, day)

use chrono::Datelike;
use dayvault::{CollectionConfig, InsertOutcome, Record, Vault, VaultConfig};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_vault_at_root(root: &std::path::Path) -> Vault {
    let config = VaultConfig::builder()
        .root_dir(root)
        .master_key("test-master-key")
        .media_workers(1)
        .build();
    Vault::open(config).unwrap()
}

fn simple_schema() -> CollectionConfig {
    CollectionConfig {
        unique: vec!["id".to_string()],
        bloom_expected_count: 10_000,
        bloom_false_positive_rate: 0.01,
        ..CollectionConfig::default()
    }
}

fn record(value: serde_json::Value) -> Record {
    Record::from_value(value).unwrap()
}

fn today() -> (i32, u32, u32) {
    let now = chrono::Local::now();
    (now.year(), now.month(), now.day())
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn test_open_creates_root_dir() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("nested").join("vault-root");

    let _vault = open_vault_at_root(&root);

    assert!(root.is_dir());
    assert!(root.join("uploads").is_dir());
}

#[test]
fn test_open_shard_count_tracks_lazy_opens() {
    let temp = TempDir::new().unwrap();
    let vault = open_vault_at_root(temp.path());
    vault.define_collection("transactions", simple_schema());

    assert_eq!(vault.open_shard_count(), 0);

    vault
        .insert("transactions", record(json!({ "id": "T1" })))
        .unwrap();
    assert_eq!(vault.open_shard_count(), 1);

    vault.get_day("transactions", 2020, 1, 1).unwrap();
    assert_eq!(vault.open_shard_count(), 2);

    vault.close();
    assert_eq!(vault.open_shard_count(), 0);
}

#[test]
fn test_collections_shard_independently() {
    let temp = TempDir::new().unwrap();
    let vault = open_vault_at_root(temp.path());
    vault.define_collection("transactions", simple_schema());
    vault.define_collection("accounts", simple_schema());

    let a = vault
        .insert("transactions", record(json!({ "id": "X1" })))
        .unwrap();
    let b = vault
        .insert("accounts", record(json!({ "id": "X1" })))
        .unwrap();

    // Same id, different collections: no cross-shard dedup
    assert!(matches!(a, InsertOutcome::Inserted { .. }));
    assert!(matches!(b, InsertOutcome::Inserted { .. }));
    assert_eq!(vault.open_shard_count(), 2);
}

// =============================================================================
// Closing
// =============================================================================

#[test]
fn test_close_with_nothing_open() {
    let temp = TempDir::new().unwrap();
    let vault = open_vault_at_root(temp.path());

    vault.close();
}

#[test]
fn test_close_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let vault = open_vault_at_root(temp.path());
    vault.define_collection("transactions", simple_schema());
    vault
        .insert("transactions", record(json!({ "id": "T1" })))
        .unwrap();

    vault.close();
    vault.close();
}

#[test]
fn test_reads_still_work_after_close() {
    let temp = TempDir::new().unwrap();
    let vault = open_vault_at_root(temp.path());
    vault.define_collection("transactions", simple_schema());
    let (year, month, day) = today();

    vault
        .insert("transactions", record(json!({ "id": "T1", "amount": 3 })))
        .unwrap();
    vault.close();

    // The shard cache is gone; a read lazily reopens from disk
    let found = vault
        .get_by_id("transactions", year, month, day, "T1")
        .unwrap()
        .unwrap();
    assert_eq!(found.get("amount"), Some(&json!(3)));
}

#[test]
fn test_close_drains_pending_media() {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    let temp = TempDir::new().unwrap();
    let (year, month, day) = today();

    {
        let vault = open_vault_at_root(temp.path());
        vault.define_collection("transactions", simple_schema());
        vault
            .insert(
                "transactions",
                record(json!({
                    "id": "T1",
                    "image_receipt": format!("data:image/png;base64,{}", BASE64.encode(b"png")),
                })),
            )
            .unwrap();
        // Closing must wait for the queued offload before shutting shards
        vault.close();
    }

    let vault = open_vault_at_root(temp.path());
    let found = vault
        .get_by_id("transactions", year, month, day, "T1")
        .unwrap()
        .unwrap();
    assert!(found.get("image_receipt").unwrap().is_string());
}

#[test]
fn test_insert_after_close_drops_media_job() {
    let temp = TempDir::new().unwrap();
    let vault = open_vault_at_root(temp.path());
    vault.define_collection("transactions", simple_schema());
    let (year, month, day) = today();

    vault.close();

    // Record writes still work; only the background offload is gone
    vault
        .insert(
            "transactions",
            record(json!({
                "id": "T1",
                "image_receipt": "data:image/png;base64,QUJD",
            })),
        )
        .unwrap();

    let found = vault
        .get_by_id("transactions", year, month, day, "T1")
        .unwrap()
        .unwrap();
    assert!(found.get("image_receipt").unwrap().is_null());
    assert_eq!(vault.media_failed(), 1);
}
