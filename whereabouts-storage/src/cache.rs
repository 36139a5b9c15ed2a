//! Two-tier TTL cache for resolved locations.
//!
//! The in-memory tier is authoritative for the process lifetime; the
//! durable store is read through once at warm-up and written through on
//! every update. Negative results ("known absent") are cached with the
//! same TTL as positives - repeat lookups for profiles with no location
//! are the common case, and skipping them is the single biggest saving
//! the cache provides.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OnceCell};
use whereabouts_core::{CachedLocation, StoredLocation, Username};

use crate::store::LocationStore;

/// Default time-to-live for cached entries: 24 hours.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Configuration for the location cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which a cached entry (positive or negative) is no longer
    /// trusted and a lookup refetches.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `WHEREABOUTS_CACHE_TTL_SECS`: entry TTL in seconds (default: 86400)
    pub fn from_env() -> Self {
        let ttl = Duration::from_secs(
            std::env::var("WHEREABOUTS_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
        );
        Self { ttl }
    }
}

/// Two-tier cache: in-memory map over a durable [`LocationStore`].
///
/// Durable I/O is best-effort everywhere: a failed read is a miss, a
/// failed write leaves the in-memory entry correct for the process
/// lifetime. No store failure ever surfaces from this type.
pub struct LocationCache {
    /// Durable backing store.
    store: Arc<dyn LocationStore>,
    /// Cache configuration.
    config: CacheConfig,
    /// In-memory tier. Entries carry their observation time so TTL expiry
    /// applies even when the process outlives the TTL.
    entries: Mutex<HashMap<Username, StoredLocation>>,
    /// One-shot warm guard: the full durable enumeration runs at most once
    /// per process lifetime.
    warm: OnceCell<()>,
}

impl LocationCache {
    /// Create a cache over the given store.
    pub fn new(store: Arc<dyn LocationStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            entries: Mutex::new(HashMap::new()),
            warm: OnceCell::new(),
        }
    }

    /// Create a cache with default configuration.
    pub fn with_defaults(store: Arc<dyn LocationStore>) -> Self {
        Self::new(store, CacheConfig::default())
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a handle to the durable backing store.
    pub fn store(&self) -> Arc<dyn LocationStore> {
        Arc::clone(&self.store)
    }

    /// Whether the one-shot warm sweep has completed.
    pub fn is_warmed(&self) -> bool {
        self.warm.initialized()
    }

    /// Look up the in-memory tier.
    ///
    /// An entry past the TTL is dropped and reported as a miss, so a stale
    /// fact never short-circuits a refetch.
    pub async fn get(&self, username: &Username) -> Option<CachedLocation> {
        let mut entries = self.entries.lock().await;
        match entries.entry(username.clone()) {
            Entry::Occupied(occupied) => {
                if occupied.get().is_fresh(Utc::now(), self.config.ttl) {
                    Some(occupied.get().value.clone())
                } else {
                    occupied.remove();
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Single-key durable probe: the cold-cache fallback used while the
    /// warm sweep has not completed.
    ///
    /// A fresh durable record populates the in-memory tier and is
    /// returned; stale records, missing records, and store errors are all
    /// misses.
    pub async fn probe_durable(&self, username: &Username) -> Option<CachedLocation> {
        let record = match self.store.get(username).await {
            Ok(record) => record?,
            Err(e) => {
                tracing::debug!(username = %username, error = %e, "durable probe failed, treating as miss");
                return None;
            }
        };

        if !record.is_fresh(Utc::now(), self.config.ttl) {
            return None;
        }

        let value = record.value.clone();
        let mut entries = self.entries.lock().await;
        entries.entry(username.clone()).or_insert(record);
        Some(value)
    }

    /// Load every fresh durable record into the in-memory tier.
    ///
    /// Idempotent and concurrency-safe: the enumeration runs at most once
    /// per process lifetime; later and concurrent calls await the first
    /// and return. Enumeration failure still counts as "warmed" - the
    /// cache then simply fills lazily, exactly as the per-key fallback
    /// does.
    pub async fn warm_from_store(&self) {
        self.warm
            .get_or_init(|| async {
                let entries = match self.store.enumerate().await {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::warn!(error = %e, "cache warm enumeration failed, filling lazily");
                        return;
                    }
                };

                let now = Utc::now();
                let mut loaded = 0usize;
                let mut memory = self.entries.lock().await;
                for (username, record) in entries {
                    let Some(record) = record else { continue };
                    if !record.is_fresh(now, self.config.ttl) {
                        continue;
                    }
                    // A concurrent put may already hold a newer fact.
                    if let Entry::Vacant(vacant) = memory.entry(username) {
                        vacant.insert(record);
                        loaded += 1;
                    }
                }
                tracing::debug!(loaded, "cache warmed from durable store");
            })
            .await;
    }

    /// Cache a resolution outcome in both tiers.
    ///
    /// The durable write is stamped with the current time and is
    /// best-effort: on failure the in-memory entry still stands.
    pub async fn put(&self, username: &Username, value: CachedLocation) {
        let record = StoredLocation::observed_now(value);
        {
            let mut entries = self.entries.lock().await;
            entries.insert(username.clone(), record.clone());
        }
        if let Err(e) = self.store.set(username, &record).await {
            tracing::debug!(username = %username, error = %e, "durable cache write failed, keeping in-memory entry");
        }
    }

    /// Cache a resolution outcome in the in-memory tier only.
    ///
    /// Used for rate-limited settlements, which must not persist: a
    /// throttled "don't know" would otherwise masquerade as a durable
    /// "does not exist" across restarts.
    pub async fn put_memory_only(&self, username: &Username, value: CachedLocation) {
        let record = StoredLocation::observed_now(value);
        let mut entries = self.entries.lock().await;
        entries.insert(username.clone(), record);
    }

    #[cfg(test)]
    async fn insert_memory_raw(&self, username: Username, record: StoredLocation) {
        self.entries.lock().await.insert(username, record);
    }
}

impl std::fmt::Debug for LocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationCache")
            .field("ttl", &self.config.ttl)
            .field("warmed", &self.is_warmed())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLocationStore;
    use whereabouts_core::Location;

    fn username(raw: &str) -> Username {
        Username::parse(raw).expect("valid handle")
    }

    fn located(raw: &str) -> CachedLocation {
        CachedLocation::Found(Location::sanitize(raw).expect("valid location"))
    }

    fn stale_record(value: CachedLocation) -> StoredLocation {
        StoredLocation {
            value,
            observed_at: Utc::now() - chrono::Duration::hours(25),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = Arc::new(MemoryLocationStore::new());
        let cache = LocationCache::with_defaults(store.clone());
        let alice = username("alice");

        cache.put(&alice, located("Paris")).await;

        assert_eq!(cache.get(&alice).await, Some(located("Paris")));
        // Write-through reached the durable tier.
        assert!(store.get(&alice).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_negative_cached_like_positive() {
        let store = Arc::new(MemoryLocationStore::new());
        let cache = LocationCache::with_defaults(store.clone());
        let bob = username("bob");

        cache.put(&bob, CachedLocation::Absent).await;

        assert_eq!(cache.get(&bob).await, Some(CachedLocation::Absent));
        let durable = store.get(&bob).await.expect("get").expect("record");
        assert!(durable.value.is_absent());
    }

    #[tokio::test]
    async fn test_durable_write_failure_is_swallowed() {
        let store = Arc::new(MemoryLocationStore::new());
        store.fail_writes(true);
        let cache = LocationCache::with_defaults(store.clone());
        let alice = username("alice");

        cache.put(&alice, located("Paris")).await;

        // In-memory tier still serves the value.
        assert_eq!(cache.get(&alice).await, Some(located("Paris")));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stale_memory_entry_expires_on_read() {
        let store = Arc::new(MemoryLocationStore::new());
        let cache = LocationCache::with_defaults(store);
        let alice = username("alice");

        cache
            .insert_memory_raw(alice.clone(), stale_record(located("Paris")))
            .await;

        assert!(cache.get(&alice).await.is_none());
        // And the expired entry is gone, not just skipped.
        assert!(cache.get(&alice).await.is_none());
    }

    #[tokio::test]
    async fn test_probe_durable_populates_memory() {
        let store = Arc::new(MemoryLocationStore::new());
        store.seed(
            username("alice"),
            StoredLocation::observed_now(located("Oslo")),
        );
        let cache = LocationCache::with_defaults(store.clone());

        assert!(cache.get(&username("alice")).await.is_none());
        assert_eq!(
            cache.probe_durable(&username("alice")).await,
            Some(located("Oslo"))
        );
        // Now resident in memory; no further store reads needed.
        let reads_before = store.get_calls();
        assert_eq!(cache.get(&username("alice")).await, Some(located("Oslo")));
        assert_eq!(store.get_calls(), reads_before);
    }

    #[tokio::test]
    async fn test_probe_durable_ignores_stale_records() {
        let store = Arc::new(MemoryLocationStore::new());
        store.seed(username("alice"), stale_record(located("Oslo")));
        let cache = LocationCache::with_defaults(store);

        assert!(cache.probe_durable(&username("alice")).await.is_none());
        assert!(cache.get(&username("alice")).await.is_none());
    }

    #[tokio::test]
    async fn test_probe_durable_swallows_store_errors() {
        let store = Arc::new(MemoryLocationStore::new());
        store.fail_reads(true);
        let cache = LocationCache::with_defaults(store);

        assert!(cache.probe_durable(&username("alice")).await.is_none());
    }

    #[tokio::test]
    async fn test_warm_loads_only_fresh_entries() {
        let store = Arc::new(MemoryLocationStore::new());
        store.seed(
            username("fresh"),
            StoredLocation::observed_now(located("Madrid")),
        );
        store.seed(username("stale"), stale_record(located("Old Town")));
        let cache = LocationCache::with_defaults(store.clone());

        assert!(!cache.is_warmed());
        cache.warm_from_store().await;
        assert!(cache.is_warmed());

        assert_eq!(cache.get(&username("fresh")).await, Some(located("Madrid")));
        assert!(cache.get(&username("stale")).await.is_none());
    }

    #[tokio::test]
    async fn test_warm_is_idempotent() {
        let store = Arc::new(MemoryLocationStore::new());
        store.seed(
            username("alice"),
            StoredLocation::observed_now(located("Madrid")),
        );
        let cache = LocationCache::with_defaults(store.clone());

        cache.warm_from_store().await;
        cache.put(&username("alice"), located("Barcelona")).await;
        // A second warm must not clobber the newer in-memory fact.
        cache.warm_from_store().await;

        assert_eq!(
            cache.get(&username("alice")).await,
            Some(located("Barcelona"))
        );
    }

    #[tokio::test]
    async fn test_warm_failure_still_marks_warmed() {
        let store = Arc::new(MemoryLocationStore::new());
        store.fail_reads(true);
        let cache = LocationCache::with_defaults(store);

        cache.warm_from_store().await;
        assert!(cache.is_warmed());
    }

    #[tokio::test]
    async fn test_put_memory_only_skips_durable_tier() {
        let store = Arc::new(MemoryLocationStore::new());
        let cache = LocationCache::with_defaults(store.clone());
        let alice = username("alice");

        cache.put_memory_only(&alice, CachedLocation::Absent).await;

        assert_eq!(cache.get(&alice).await, Some(CachedLocation::Absent));
        assert!(store.is_empty());
        assert_eq!(store.set_calls(), 0);
    }
}
