//! Secret settings encryption for notification channels.
//!
//! Channel secrets are stored as base64 text. Each payload is either a legacy plaintext
//! value or `0x01 | nonce(12) | ciphertext+tag` sealed with AES-256-GCM, bound to the
//! owning org and channel uid through the additional authenticated data.

#![allow(deprecated)]

use std::collections::BTreeMap;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("secret '{field}' is not valid base64: {reason}")]
    InvalidEncoding { field: String, reason: String },
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// AES-256 key material, wiped on drop.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(SecretKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// AAD binding a secret to the channel or receiver that owns it.
pub fn secure_settings_aad(org_id: i64, uid: &str) -> String {
    format!("{}|{}", org_id, uid)
}

pub fn encrypt_bytes(key: &SecretKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut sealed = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut sealed);
    Ok(result)
}

/// Opens a payload produced by [`encrypt_bytes`]; payloads without the version marker are
/// legacy plaintext and returned as-is.
pub fn decrypt_bytes(key: &SecretKey, aad: &[u8], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if payload.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }
    if payload[0] != VERSION_ENCRYPTED {
        return Ok(payload.to_vec());
    }
    if payload.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&payload[1..1 + NONCE_LEN]);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &payload[1 + NONCE_LEN..],
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

pub fn is_encrypted_payload(payload: &[u8]) -> bool {
    payload.len() >= MIN_ENCRYPTED_LEN && payload[0] == VERSION_ENCRYPTED
}

/// Decodes and decrypts every entry of a stored secure settings map.
pub fn decrypt_secure_settings(
    key: &SecretKey,
    aad: &str,
    encoded: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, CryptoError> {
    let mut decrypted = BTreeMap::new();
    for (field, value) in encoded {
        if value.is_empty() {
            decrypted.insert(field.clone(), String::new());
            continue;
        }
        let raw = STANDARD
            .decode(value)
            .map_err(|e| CryptoError::InvalidEncoding {
                field: field.clone(),
                reason: e.to_string(),
            })?;
        let plain = decrypt_bytes(key, aad.as_bytes(), &raw)?;
        let plain = String::from_utf8(plain)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8 in '{}': {}", field, e)))?;
        decrypted.insert(field.clone(), plain);
    }
    Ok(decrypted)
}

/// Encrypts and base64-encodes every entry of a plaintext secure settings map.
pub fn encrypt_secure_settings(
    key: &SecretKey,
    aad: &str,
    plain: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, CryptoError> {
    plain
        .iter()
        .map(|(field, value)| {
            let sealed = encrypt_bytes(key, aad.as_bytes(), value.as_bytes())?;
            Ok((field.clone(), STANDARD.encode(sealed)))
        })
        .collect()
}
