//! Tests for the crypto primitives
//!
//! These tests verify:
//! - SHA-256 fingerprints against known vectors
//! - Deterministic daily key derivation
//! - Authenticated sealing: roundtrip, tamper rejection, wrong-key rejection

use dayvault::crypto::{derive_daily_key, open_sealed, seal, sha256_hex, NONCE_LEN};
use dayvault::VaultError;

// =============================================================================
// Fingerprints
// =============================================================================

#[test]
fn test_sha256_hex_known_vector() {
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_sha256_hex_empty_input() {
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

// =============================================================================
// Daily Key Derivation
// =============================================================================

#[test]
fn test_derive_daily_key_deterministic() {
    let a = derive_daily_key(2024, 3, 15, "master");
    let b = derive_daily_key(2024, 3, 15, "master");

    assert_eq!(a, b);
}

#[test]
fn test_derive_daily_key_varies_by_day() {
    let a = derive_daily_key(2024, 3, 15, "master");
    let b = derive_daily_key(2024, 3, 16, "master");

    assert_ne!(a, b);
}

#[test]
fn test_derive_daily_key_varies_by_master() {
    let a = derive_daily_key(2024, 3, 15, "master-one");
    let b = derive_daily_key(2024, 3, 15, "master-two");

    assert_ne!(a, b);
}

#[test]
fn test_derive_daily_key_is_hash_of_date_and_master() {
    // The key bytes are exactly SHA-256("YYYY-MM-DD" + master)
    let key = derive_daily_key(2024, 3, 5, "master");

    let key_hex: String = key.iter().map(|b| format!("{b:02x}")).collect();
    assert_eq!(key_hex, sha256_hex(b"2024-03-05master"));
}

// =============================================================================
// Sealing
// =============================================================================

#[test]
fn test_seal_open_roundtrip() {
    let key = derive_daily_key(2024, 1, 1, "master");

    let sealed = seal(&key, b"secret frame").unwrap();
    let opened = open_sealed(&key, &sealed).unwrap();

    assert_eq!(opened, b"secret frame");
}

#[test]
fn test_seal_draws_fresh_nonces() {
    let key = derive_daily_key(2024, 1, 1, "master");

    let a = seal(&key, b"same plaintext").unwrap();
    let b = seal(&key, b"same plaintext").unwrap();

    assert_ne!(a, b);
    assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
}

#[test]
fn test_open_rejects_tampering() {
    let key = derive_daily_key(2024, 1, 1, "master");
    let mut sealed = seal(&key, b"secret frame").unwrap();

    let last = sealed.len() - 1;
    sealed[last] ^= 0x01;

    let result = open_sealed(&key, &sealed);
    assert!(matches!(result, Err(VaultError::Crypto(_))));
}

#[test]
fn test_open_rejects_wrong_key() {
    let key = derive_daily_key(2024, 1, 1, "master");
    let other = derive_daily_key(2024, 1, 2, "master");
    let sealed = seal(&key, b"secret frame").unwrap();

    let result = open_sealed(&other, &sealed);
    assert!(matches!(result, Err(VaultError::Crypto(_))));
}

#[test]
fn test_open_rejects_truncated_payload() {
    let key = derive_daily_key(2024, 1, 1, "master");

    let result = open_sealed(&key, &[0u8; NONCE_LEN - 1]);
    assert!(matches!(result, Err(VaultError::Crypto(_))));
}
