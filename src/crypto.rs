//! Crypto primitives for DayVault
//!
//! Stateless helpers: SHA-256 fingerprints, per-day key derivation, and
//! authenticated sealing of shard frames (XChaCha20-Poly1305).

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};

/// Symmetric key size in bytes
pub const KEY_LEN: usize = 32;

/// XChaCha20 nonce size in bytes, prepended to every sealed payload
pub const NONCE_LEN: usize = 24;

/// A derived per-day symmetric key
pub type DailyKey = [u8; KEY_LEN];

/// SHA-256 fingerprint of arbitrary bytes, as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Derive the symmetric key for one calendar day.
///
/// Deterministic: SHA-256 of the `YYYY-MM-DD` date string concatenated with
/// the master secret. The same date and secret always yield the same key, so
/// shards reopen across process restarts without persisting key material.
pub fn derive_daily_key(year: i32, month: u32, day: u32, master: &str) -> DailyKey {
    let date_str = format!("{year:04}-{month:02}-{day:02}");
    let mut hasher = Sha256::new();
    hasher.update(date_str.as_bytes());
    hasher.update(master.as_bytes());
    hasher.finalize().into()
}

/// Seal plaintext under a daily key.
///
/// Output layout: `[nonce (24 bytes)][ciphertext + tag]`. A fresh random
/// nonce is drawn per call.
pub fn seal(key: &DailyKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| VaultError::Crypto("encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed payload produced by [`seal`].
///
/// Fails on truncation, tampering, or a wrong key.
pub fn open_sealed(key: &DailyKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(VaultError::Crypto(format!(
            "sealed payload too short: {} bytes",
            sealed.len()
        )));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::Crypto("decryption failed: bad key or tampered data".to_string()))
}
