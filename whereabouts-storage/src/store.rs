//! Durable store trait and in-memory implementation.
//!
//! The store is a plain key/value area: one record per username, stamped
//! with an observation time. It has no expiry logic of its own; freshness
//! decisions belong to the cache and the sweeper.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use whereabouts_core::{StoreError, StoredLocation, Username, WhereaboutsResult};

/// Durable key/value store for location records.
///
/// Implementations must be thread-safe. Writes to different keys never
/// conflict; writes to the same key are last-write-wins.
///
/// `enumerate` yields `None` in place of a record it could not decode, so
/// the sweeper can purge corrupt entries. Keys outside the store's location
/// namespace are never surfaced.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Get the record for a username, if present.
    async fn get(&self, username: &Username) -> WhereaboutsResult<Option<StoredLocation>>;

    /// Insert or replace the record for a username.
    async fn set(&self, username: &Username, record: &StoredLocation) -> WhereaboutsResult<()>;

    /// List every record in the location namespace.
    async fn enumerate(&self) -> WhereaboutsResult<Vec<(Username, Option<StoredLocation>)>>;

    /// Remove the records for the given usernames, returning how many
    /// existed.
    async fn remove(&self, usernames: &[Username]) -> WhereaboutsResult<u64>;
}

/// In-memory [`LocationStore`] backed by a `HashMap`.
///
/// Primarily a test double, with optional failure injection to exercise
/// the cache layer's best-effort durability. Also usable as a real store
/// for processes that don't need persistence across restarts.
#[derive(Default)]
pub struct MemoryLocationStore {
    records: RwLock<HashMap<Username, StoredLocation>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    get_calls: AtomicU64,
    set_calls: AtomicU64,
}

impl MemoryLocationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with a transaction error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make every subsequent write fail with a transaction error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of `get` calls observed.
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Number of `set` calls observed (including failed ones).
    pub fn set_calls(&self) -> u64 {
        self.set_calls.load(Ordering::Relaxed)
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a record directly, bypassing call counters. Test seeding.
    pub fn seed(&self, username: Username, record: StoredLocation) {
        if let Ok(mut records) = self.records.write() {
            records.insert(username, record);
        }
    }

    fn injected(reason: &str) -> whereabouts_core::WhereaboutsError {
        StoreError::Transaction {
            reason: reason.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl LocationStore for MemoryLocationStore {
    async fn get(&self, username: &Username) -> WhereaboutsResult<Option<StoredLocation>> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Self::injected("injected read failure"));
        }
        let records = self
            .records
            .read()
            .map_err(|_| Self::injected("lock poisoned"))?;
        Ok(records.get(username).cloned())
    }

    async fn set(&self, username: &Username, record: &StoredLocation) -> WhereaboutsResult<()> {
        self.set_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Self::injected("injected write failure"));
        }
        let mut records = self
            .records
            .write()
            .map_err(|_| Self::injected("lock poisoned"))?;
        records.insert(username.clone(), record.clone());
        Ok(())
    }

    async fn enumerate(&self) -> WhereaboutsResult<Vec<(Username, Option<StoredLocation>)>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Self::injected("injected read failure"));
        }
        let records = self
            .records
            .read()
            .map_err(|_| Self::injected("lock poisoned"))?;
        Ok(records
            .iter()
            .map(|(username, record)| (username.clone(), Some(record.clone())))
            .collect())
    }

    async fn remove(&self, usernames: &[Username]) -> WhereaboutsResult<u64> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Self::injected("injected write failure"));
        }
        let mut records = self
            .records
            .write()
            .map_err(|_| Self::injected("lock poisoned"))?;
        let mut removed = 0u64;
        for username in usernames {
            if records.remove(username).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for MemoryLocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLocationStore")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
