//! At-rest encryption of the single upstream credential.
//!
//! Payload format: `base64(nonce[12] || ciphertext+tag)`, ChaCha20-Poly1305
//! under a per-installation 256-bit key. The key lives in the local tier under
//! [`ENCRYPTION_KEY`] as a JSON array of 32 integers and is created lazily by
//! the first `encrypt`. Decryption never creates a key.
//!
//! The decrypted credential is returned per call and never cached.

use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use glimpse_types::ApiKey;
use serde_json::Value;
use thiserror::Error;

use crate::storage::{CREDENTIAL_KEY, ENCRYPTION_KEY, KeyValueStore, StorageError};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

type KeyBytes = [u8; KEY_LEN];

/// Failures while encrypting or storing.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// No secure randomness, or the cipher cannot be built. Fatal.
    #[error("secure encryption is unavailable: {0}")]
    CryptoUnavailable(String),
    #[error("stored encryption key is corrupt")]
    CorruptKey,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures while decrypting. Always a recoverable data problem.
#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("Invalid encrypted token format.")]
    InvalidPayloadFormat,
    #[error("Invalid encrypted token payload.")]
    InvalidEncryptedPayload,
    #[error("No encryption key is stored.")]
    MissingKey,
    #[error("Stored encryption key is corrupt.")]
    CorruptKey,
    #[error("Encrypted token is not valid base64.")]
    Decode(#[from] base64::DecodeError),
    #[error("Encrypted token failed authentication.")]
    Authentication,
    #[error("Decrypted token is not valid UTF-8.")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct SecretStore {
    local: Arc<dyn KeyValueStore>,
    /// Serializes get-or-create of the key.
    key_lock: Mutex<()>,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore").finish_non_exhaustive()
    }
}

impl SecretStore {
    #[must_use]
    pub fn new(local: Arc<dyn KeyValueStore>) -> Self {
        Self {
            local,
            key_lock: Mutex::new(()),
        }
    }

    /// Encrypt `plaintext`. Empty input is a no-op returning `""`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretStoreError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let key = self.key_or_create()?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| SecretStoreError::CryptoUnavailable(format!("cipher init: {e}")))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| SecretStoreError::CryptoUnavailable(format!("nonce generation: {e}")))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| SecretStoreError::CryptoUnavailable(format!("encryption: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    /// Decrypt a payload produced by [`SecretStore::encrypt`]. `""` yields `""`.
    pub fn decrypt(&self, encoded: &str) -> Result<String, DecryptError> {
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let payload = BASE64.decode(encoded.trim())?;
        if payload.len() <= NONCE_LEN {
            return Err(DecryptError::InvalidEncryptedPayload);
        }

        let key = match self.load_key()? {
            StoredKey::Valid(key) => key,
            StoredKey::Corrupt => return Err(DecryptError::CorruptKey),
            StoredKey::Missing => return Err(DecryptError::MissingKey),
        };
        let cipher =
            ChaCha20Poly1305::new_from_slice(&key).map_err(|_| DecryptError::CorruptKey)?;

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DecryptError::Authentication)?;
        Ok(String::from_utf8(plaintext)?)
    }

    /// Decrypt a value read straight from storage. Non-strings are rejected.
    pub fn decrypt_value(&self, stored: &Value) -> Result<String, DecryptError> {
        match stored {
            Value::String(encoded) => self.decrypt(encoded),
            _ => Err(DecryptError::InvalidPayloadFormat),
        }
    }

    /// Encrypt and persist the credential. Blank input clears it.
    pub fn store_credential(&self, plaintext: &str) -> Result<(), SecretStoreError> {
        let trimmed = plaintext.trim();
        if trimmed.is_empty() {
            self.clear_credential()?;
            return Ok(());
        }
        let encrypted = self.encrypt(trimmed)?;
        self.local.set(CREDENTIAL_KEY, Value::String(encrypted))?;
        tracing::info!("Stored encrypted API credential");
        Ok(())
    }

    pub fn clear_credential(&self) -> Result<(), StorageError> {
        self.local.remove(CREDENTIAL_KEY)?;
        tracing::info!("Cleared API credential");
        Ok(())
    }

    /// Read and decrypt the credential. `Ok(None)` when none is stored.
    pub fn load_credential(&self) -> Result<Option<ApiKey>, DecryptError> {
        let Some(stored) = self.local.get(CREDENTIAL_KEY)? else {
            return Ok(None);
        };
        let plaintext = self.decrypt_value(&stored)?;
        Ok(ApiKey::new(plaintext))
    }

    fn load_key(&self) -> Result<StoredKey, StorageError> {
        Ok(match self.local.get(ENCRYPTION_KEY)? {
            None => StoredKey::Missing,
            Some(value) => key_from_value(&value).map_or(StoredKey::Corrupt, StoredKey::Valid),
        })
    }

    fn key_or_create(&self) -> Result<KeyBytes, SecretStoreError> {
        let _guard = self.key_lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.load_key()? {
            StoredKey::Valid(key) => return Ok(key),
            StoredKey::Corrupt => return Err(SecretStoreError::CorruptKey),
            StoredKey::Missing => {}
        }

        let mut key = [0u8; KEY_LEN];
        OsRng.try_fill_bytes(&mut key).map_err(|e| {
            tracing::error!("Secure randomness unavailable for key generation: {e}");
            SecretStoreError::CryptoUnavailable(format!("key generation: {e}"))
        })?;
        let stored = Value::Array(key.iter().map(|b| Value::from(*b)).collect());
        self.local.set(ENCRYPTION_KEY, stored)?;
        tracing::info!("Generated installation encryption key");
        Ok(key)
    }
}

enum StoredKey {
    Missing,
    Corrupt,
    Valid(KeyBytes),
}

fn key_from_value(value: &Value) -> Option<KeyBytes> {
    let items = value.as_array()?;
    if items.len() != KEY_LEN {
        return None;
    }
    let mut key = [0u8; KEY_LEN];
    for (slot, item) in key.iter_mut().zip(items) {
        *slot = item.as_u64().and_then(|n| u8::try_from(n).ok())?;
    }
    Some(key)
}
