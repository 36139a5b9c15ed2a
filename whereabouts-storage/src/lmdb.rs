//! LMDB-backed durable location store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts.
//!
//! # Key namespace
//!
//! Location records live under the `loc/` key prefix. `enumerate` only
//! surfaces keys in that namespace, so the same environment can host other
//! data without it leaking into cache warms or sweeps. `/` cannot occur in
//! a validated username, so decoding the suffix back into a key is
//! unambiguous.
//!
//! # Record framing
//!
//! Values are framed as `[observed_at millis: 8 bytes LE][JSON value]`,
//! with the timestamp kept out of the JSON so freshness checks never
//! require a full decode.
//!
//! # Thread safety
//!
//! LMDB provides ACID transactions: read transactions for `get` and
//! `enumerate`, one write transaction per `set`/`remove`. Writes to a key
//! are atomic, so a torn record can only mean external corruption.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use whereabouts_core::{
    CachedLocation, StoreError, StoredLocation, Username, WhereaboutsResult,
};

use crate::store::LocationStore;

/// Key prefix for location records.
const KEY_PREFIX: &str = "loc/";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for whereabouts_core::WhereaboutsError {
    fn from(e: LmdbStoreError) -> Self {
        let store_error = match e {
            LmdbStoreError::EnvOpen(reason) => StoreError::EnvOpen { reason },
            LmdbStoreError::DbOpen(reason) => StoreError::DbOpen { reason },
            LmdbStoreError::Transaction(reason) => StoreError::Transaction { reason },
            LmdbStoreError::Serialization(reason) => StoreError::Io { reason },
            LmdbStoreError::Io(e) => StoreError::Io {
                reason: e.to_string(),
            },
        };
        store_error.into()
    }
}

/// LMDB-backed [`LocationStore`].
///
/// # Example
///
/// ```ignore
/// use whereabouts_storage::LmdbLocationStore;
///
/// let store = LmdbLocationStore::new("/var/lib/whereabouts", 64)?;
/// store.set(&username, &record).await?;
/// let cached = store.get(&username).await?;
/// ```
pub struct LmdbLocationStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbLocationStore {
    /// Open (or create) a store under the given directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the LMDB
    /// environment cannot be opened, or the database cannot be created.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    fn encode_key(username: &Username) -> Vec<u8> {
        format!("{}{}", KEY_PREFIX, username.as_str()).into_bytes()
    }

    /// Recover the username from a namespaced key. `None` for keys outside
    /// the namespace or with a suffix that is not a valid handle.
    fn decode_key(key: &[u8]) -> Option<Username> {
        let key = std::str::from_utf8(key).ok()?;
        let suffix = key.strip_prefix(KEY_PREFIX)?;
        Username::parse(suffix).ok()
    }

    fn encode_record(record: &StoredLocation) -> Result<Vec<u8>, LmdbStoreError> {
        let timestamp_bytes = record.observed_at.timestamp_millis().to_le_bytes();
        let value_bytes = serde_json::to_vec(&record.value)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;

        let mut full_bytes = Vec::with_capacity(8 + value_bytes.len());
        full_bytes.extend_from_slice(&timestamp_bytes);
        full_bytes.extend_from_slice(&value_bytes);
        Ok(full_bytes)
    }

    /// Decode a framed record. `None` when the bytes are not a valid frame;
    /// the caller decides whether that means "skip" or "purge".
    fn decode_record(bytes: &[u8]) -> Option<StoredLocation> {
        if bytes.len() < 8 {
            return None;
        }
        let timestamp_bytes: [u8; 8] = bytes[0..8].try_into().ok()?;
        let timestamp_millis = i64::from_le_bytes(timestamp_bytes);
        let observed_at: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_millis)?;
        let value: CachedLocation = serde_json::from_slice(&bytes[8..]).ok()?;
        Some(StoredLocation { value, observed_at })
    }
}

#[async_trait]
impl LocationStore for LmdbLocationStore {
    async fn get(&self, username: &Username) -> WhereaboutsResult<Option<StoredLocation>> {
        let encoded_key = Self::encode_key(username);

        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, &encoded_key) {
            Ok(Some(bytes)) => Ok(Self::decode_record(bytes)),
            Ok(None) => Ok(None),
            Err(e) => Err(LmdbStoreError::Transaction(e.to_string()).into()),
        }
    }

    async fn set(&self, username: &Username, record: &StoredLocation) -> WhereaboutsResult<()> {
        let encoded_key = Self::encode_key(username);
        let full_bytes = Self::encode_record(record)?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, &encoded_key, &full_bytes)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn enumerate(&self) -> WhereaboutsResult<Vec<(Username, Option<StoredLocation>)>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut entries = Vec::new();
        for result in iter {
            let Ok((key, bytes)) = result else { continue };
            let Some(username) = Self::decode_key(key) else {
                continue;
            };
            entries.push((username, Self::decode_record(bytes)));
        }

        Ok(entries)
    }

    async fn remove(&self, usernames: &[Username]) -> WhereaboutsResult<u64> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut removed = 0u64;
        for username in usernames {
            let encoded_key = Self::encode_key(username);
            if self.db.delete(&mut wtxn, &encoded_key).unwrap_or(false) {
                removed += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(removed)
    }
}

impl std::fmt::Debug for LmdbLocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbLocationStore").finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
