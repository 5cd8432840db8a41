//! Tests for background media offload
//!
//! These tests verify:
//! - Media-bearing fields are nulled in the synchronous write and patched to
//!   blob filenames by the background pool
//! - Blob files land under uploads/ with the declared extension
//! - Failures leave the placeholder in place, count on the failure counter,
//!   and never affect sibling fields
//! - Index entries follow the field from placeholder to filename

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Datelike;
use dayvault::{CollectionConfig, InsertOutcome, Record, Vault, VaultConfig};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_test_vault() -> (TempDir, Vault) {
    let temp = TempDir::new().unwrap();
    let config = VaultConfig::builder()
        .root_dir(temp.path())
        .master_key("test-master-key")
        .media_workers(2)
        .build();
    let vault = Vault::open(config).unwrap();
    (temp, vault)
}

fn receipts_schema() -> CollectionConfig {
    CollectionConfig {
        unique: vec!["id".to_string()],
        indexed: vec!["image_logo".to_string()],
        bloom_expected_count: 10_000,
        bloom_false_positive_rate: 0.01,
        ..CollectionConfig::default()
    }
}

fn record(value: serde_json::Value) -> Record {
    Record::from_value(value).unwrap()
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

fn today() -> (i32, u32, u32) {
    let now = chrono::Local::now();
    (now.year(), now.month(), now.day())
}

fn get_record(vault: &Vault, id: &str) -> Option<Record> {
    let (year, month, day) = today();
    vault
        .get_by_id("receipts", year, month, day, id)
        .unwrap()
}

/// Poll until the field reads as a string (the patched filename)
fn wait_for_patch(vault: &Vault, id: &str, field: &str) -> Option<Record> {
    for _ in 0..200 {
        if let Some(rec) = get_record(vault, id) {
            if rec.get(field).map_or(false, |v| v.is_string()) {
                return Some(rec);
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
    None
}

// =============================================================================
// Offload Happy Path
// =============================================================================

#[test]
fn test_media_field_patched_to_filename() {
    let (temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    let outcome = vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_receipt": data_url("image/png", b"fake png bytes"),
            })),
        )
        .unwrap();
    assert!(matches!(outcome, InsertOutcome::Inserted { .. }));

    // Close drains the pool, making the patch visible deterministically
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    let filename = stored.get("image_receipt").unwrap().as_str().unwrap();
    assert!(filename.ends_with(".png"));
    assert!(!filename.starts_with("data:"));

    let blob = std::fs::read(temp.path().join("uploads").join(filename)).unwrap();
    assert_eq!(blob, b"fake png bytes");

    assert_eq!(vault.media_completed(), 1);
    assert_eq!(vault.media_failed(), 0);
}

#[test]
fn test_media_patch_preserves_other_fields() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "amount": 250,
                "note": "lunch",
                "image_receipt": data_url("image/jpeg", b"jpeg"),
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    assert_eq!(stored.get("amount"), Some(&json!(250)));
    assert_eq!(stored.get("note"), Some(&json!("lunch")));
    assert!(stored.get("image_receipt").unwrap().is_string());
}

#[test]
fn test_media_eventually_patches_while_running() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_receipt": data_url("image/png", b"bytes"),
            })),
        )
        .unwrap();

    // No close here: the running pool must get there on its own
    let stored = wait_for_patch(&vault, "R1", "image_receipt")
        .expect("media field never got patched");
    assert!(stored
        .get("image_receipt")
        .unwrap()
        .as_str()
        .unwrap()
        .ends_with(".png"));

    vault.close();
}

#[test]
fn test_video_field_offloaded() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "video_clip": data_url("video/mp4", b"mp4 bytes"),
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    let filename = stored.get("video_clip").unwrap().as_str().unwrap();
    assert!(filename.ends_with(".mp4"));
}

// =============================================================================
// Extension Mapping
// =============================================================================

#[test]
fn test_structured_mime_suffix_is_stripped() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_icon": data_url("image/svg+xml", b"<svg/>"),
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    let filename = stored.get("image_icon").unwrap().as_str().unwrap();
    assert!(filename.ends_with(".svg"));
}

#[test]
fn test_unrecognizable_mime_falls_back_to_bin() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_blob": data_url("weird", b"???"),
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    let filename = stored.get("image_blob").unwrap().as_str().unwrap();
    assert!(filename.ends_with(".bin"));
}

// =============================================================================
// Failure Handling
// =============================================================================

#[test]
fn test_media_failure_leaves_placeholder_and_counts() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_receipt": "data:image/png;base64,%%%not-base64%%%",
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    assert!(stored.get("image_receipt").unwrap().is_null());

    assert_eq!(vault.media_completed(), 0);
    assert_eq!(vault.media_failed(), 1);
}

#[test]
fn test_media_sibling_fields_are_independent() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_good": data_url("image/png", b"fine"),
                "image_bad": "data:image/png;base64,%%%not-base64%%%",
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    assert!(stored.get("image_good").unwrap().is_string());
    assert!(stored.get("image_bad").unwrap().is_null());

    assert_eq!(vault.media_completed(), 1);
    assert_eq!(vault.media_failed(), 1);
}

// =============================================================================
// Index Maintenance
// =============================================================================

#[test]
fn test_index_entry_follows_patched_field() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());
    let (year, month, day) = today();

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_logo": data_url("image/png", b"logo"),
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    let filename = stored
        .get("image_logo")
        .unwrap()
        .as_str()
        .unwrap()
        .to_string();

    // The placeholder entry is gone, the filename entry resolves
    let by_placeholder = vault
        .get_by_field("receipts", year, month, day, "image_logo", "null")
        .unwrap();
    assert!(by_placeholder.is_none());

    let by_filename = vault
        .get_by_field("receipts", year, month, day, "image_logo", &filename)
        .unwrap();
    assert!(by_filename.is_some());
}

// =============================================================================
// Detachment Rules
// =============================================================================

#[test]
fn test_plain_url_media_field_not_detached() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    vault
        .insert(
            "receipts",
            record(json!({
                "id": "R1",
                "image_remote": "https://cdn.example.com/pic.png",
            })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    assert_eq!(
        stored.get("image_remote"),
        Some(&json!("https://cdn.example.com/pic.png"))
    );
    assert_eq!(vault.media_completed(), 0);
}

#[test]
fn test_field_outside_naming_convention_not_detached() {
    let (_temp, vault) = open_test_vault();
    vault.define_collection("receipts", receipts_schema());

    let url = data_url("image/png", b"inline");
    vault
        .insert(
            "receipts",
            record(json!({ "id": "R1", "avatar": url.clone() })),
        )
        .unwrap();
    vault.close();

    let stored = get_record(&vault, "R1").unwrap();
    assert_eq!(stored.get("avatar"), Some(&json!(url)));
    assert_eq!(vault.media_completed(), 0);
}
