//! Key/value storage tiers.
//!
//! The gateway persists three local-tier keys (the encryption key, the
//! encrypted credential, and the price table) and one session-tier key (the
//! abortable correlation id). Values are JSON; every `set` replaces the whole
//! value under its key.
//!
//! - [`FileStore`]: one JSON object on disk, re-read on every access and
//!   rewritten atomically on every mutation with owner-only permissions.
//!   Readers never observe a partial write.
//! - [`MemoryStore`]: process-lifetime map; the session tier and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use glimpse_utils::{atomic_write, recover_bak_file};
use serde_json::Value;
use thiserror::Error;

/// Local-tier key: raw 256-bit encryption key as a JSON array of integers.
pub const ENCRYPTION_KEY: &str = "encryptionKey_v1";
/// Local-tier key: base64 `nonce || ciphertext` of the API credential.
pub const CREDENTIAL_KEY: &str = "apiKey_encrypted";
/// Local-tier key: `modelId -> PriceEntry` mapping.
pub const PRICES_KEY: &str = "knownModelsAndPrices";
/// Session-tier key: correlation id currently eligible for abort.
pub const CURRENT_REQUEST_KEY: &str = "currentChatRequestId";

const LOCAL_STORE_FILE: &str = "local.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("storage document at {} is not a JSON object: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize stored value: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

type Document = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Document>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// A JSON document on disk, read afresh on every access.
///
/// Other processes (`glimpse credential set`) rewrite the same file, so
/// nothing is cached. Each mutation is a read-modify-write of the current
/// file; mutations within this process are serialized.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        recover_bak_file(&path);

        let document = read_document(&path)?;
        tracing::debug!(path = %path.display(), keys = document.len(), "Opened local store");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `edit` to the on-disk document. Skips the write when `edit`
    /// reports no change.
    fn mutate(&self, edit: impl FnOnce(&mut Document) -> bool) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = read_document(&self.path)?;
        if !edit(&mut document) {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(&document)?;
        atomic_write(&self.path, &bytes).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn read_document(path: &Path) -> Result<Document, StorageError> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(read_document(&self.path)?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.mutate(|doc| {
            doc.insert(key.to_string(), value);
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|doc| doc.remove(key).is_some())
    }
}

/// The two storage tiers the gateway uses.
#[derive(Clone)]
pub struct Storage {
    /// Survives restarts.
    pub local: Arc<dyn KeyValueStore>,
    /// Lives as long as the process.
    pub session: Arc<dyn KeyValueStore>,
}

impl Storage {
    /// File-backed local tier under `data_dir`, in-memory session tier.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let local = FileStore::open(data_dir.join(LOCAL_STORE_FILE))?;
        Ok(Self {
            local: Arc::new(local),
            session: Arc::new(MemoryStore::new()),
        })
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            local: Arc::new(MemoryStore::new()),
            session: Arc::new(MemoryStore::new()),
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
