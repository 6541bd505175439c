// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encryption at Rest
//!
//! AES-256-GCM wrapper used to protect OAuth tokens before they are written
//! to the key-value store, plus the hashing and random-token helpers used for
//! magic links and PINs.
//!
//! ## Wire Format
//!
//! [`EncryptedData`] carries three independently base64url-encoded fields
//! (no padding):
//!
//! | Field | Content |
//! |-------|---------|
//! | `ciphertext` | AES-GCM output without the tag |
//! | `iv` | fresh 96-bit nonce |
//! | `tag` | 128-bit authentication tag |

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of the AES-GCM authentication tag in bytes.
const TAG_LEN: usize = 16;

/// Default magic-token size in raw bytes (22 base64url characters).
pub const DEFAULT_TOKEN_BYTES: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid master key: {0}")]
    InvalidKey(String),

    /// Deliberately carries no detail.
    #[error("Decryption failed: Invalid key or corrupted data")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("system random source unavailable")]
    Random,
}

/// Encrypted value as stored in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedData {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// 256-bit master key, parsed from a 64-character hex string.
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not hex: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(key))
    }

    fn aead_key(&self) -> Result<LessSafeKey, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| CryptoError::InvalidKey("rejected by AES-256-GCM".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Encrypt a UTF-8 string with a fresh random IV.
pub fn encrypt(plaintext: &str, key: &MasterKey) -> Result<EncryptedData, CryptoError> {
    let aead_key = key.aead_key()?;

    let mut iv = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| CryptoError::Random)?;

    let mut in_out = plaintext.as_bytes().to_vec();
    let tag = aead_key
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(iv),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedData {
        ciphertext: Base64UrlUnpadded::encode_string(&in_out),
        iv: Base64UrlUnpadded::encode_string(&iv),
        tag: Base64UrlUnpadded::encode_string(tag.as_ref()),
    })
}

/// Decrypt an [`EncryptedData`] record.
///
/// Every failure (bad encoding, wrong key, tampered data) collapses into
/// [`CryptoError::DecryptionFailed`].
pub fn decrypt(encrypted: &EncryptedData, key: &MasterKey) -> Result<String, CryptoError> {
    let aead_key = key.aead_key()?;

    let iv = Base64UrlUnpadded::decode_vec(&encrypted.iv)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let ciphertext = Base64UrlUnpadded::decode_vec(&encrypted.ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    let tag = Base64UrlUnpadded::decode_vec(&encrypted.tag)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    if tag.len() != TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let nonce =
        Nonce::try_assume_unique_for_key(&iv).map_err(|_| CryptoError::DecryptionFailed)?;

    let mut in_out = ciphertext;
    in_out.extend_from_slice(&tag);

    let plaintext = aead_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::DecryptionFailed)
}

/// SHA-256 of a string as 64 lowercase hex characters.
pub fn sha256_hash(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Cryptographically random base64url token of `byte_length` raw bytes.
pub fn generate_secure_token(byte_length: usize) -> Result<String, CryptoError> {
    let mut buffer = vec![0u8; byte_length];
    SystemRandom::new()
        .fill(&mut buffer)
        .map_err(|_| CryptoError::Random)?;
    Ok(Base64UrlUnpadded::encode_string(&buffer))
}

/// Uniformly distributed 4-digit PIN, zero padded.
pub fn generate_pin() -> Result<String, CryptoError> {
    let rng = SystemRandom::new();
    // Rejection sampling keeps the distribution uniform over 0..10000.
    loop {
        let mut raw = [0u8; 2];
        rng.fill(&mut raw).map_err(|_| CryptoError::Random)?;
        let value = u16::from_be_bytes(raw);
        if value < 60_000 {
            return Ok(format!("{:04}", value % 10_000));
        }
    }
}

/// Random lowercase hex string of `byte_length` bytes.
pub fn random_hex(byte_length: usize) -> Result<String, CryptoError> {
    let mut buffer = vec![0u8; byte_length];
    SystemRandom::new()
        .fill(&mut buffer)
        .map_err(|_| CryptoError::Random)?;
    Ok(hex::encode(buffer))
}

/// Length-independent-time equality for hex digests.
pub fn digests_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
