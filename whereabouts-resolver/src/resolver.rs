//! Resolution entry point and dispatch loop.
//!
//! `Resolver::resolve` walks a fixed ladder for every call: validate,
//! in-memory cache, backoff window, cold-cache durable probe, pending
//! share, retry budget, enqueue. Everything after validation degrades to
//! "no location" - the pipeline never surfaces an error to lookup callers.
//!
//! Dispatch is a single logical admission loop: strictly FIFO, one
//! governor admission per launch, at most `max_concurrent_fetches` lookups
//! in flight. The loop starts lazily on the first enqueue and parks itself
//! when the queue drains; restarting it is a cheap compare-and-swap no-op.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::time::Instant;
use whereabouts_core::{CachedLocation, Location, Username, WhereaboutsResult};
use whereabouts_fetch::{FetchOutcome, ProfileFetcher};
use whereabouts_storage::{sweep_expired, LocationCache};

use crate::backoff::BackoffTracker;
use crate::config::ResolverConfig;
use crate::governor::RateGovernor;

/// The lookup-resolution pipeline.
///
/// Cheap to clone; all clones share one cache, one backoff table, one
/// governor, and one dispatch loop.
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    config: ResolverConfig,
    cache: LocationCache,
    fetcher: Arc<dyn ProfileFetcher>,
    backoff: Mutex<BackoffTracker>,
    governor: RateGovernor,
    /// One sender per in-flight username; every concurrent caller shares
    /// the settlement through it.
    pending: Mutex<HashMap<Username, broadcast::Sender<Option<Location>>>>,
    /// FIFO admission queue.
    queue: Mutex<VecDeque<Username>>,
    /// Execution slots for concurrently running lookups.
    slots: Arc<Semaphore>,
    /// Single-drainer flag for the admission loop.
    draining: AtomicBool,
    /// One-shot trigger for the background cache warm.
    warm_kicked: AtomicBool,
}

impl Resolver {
    /// Create a resolver over a cache and a fetcher.
    pub fn new(
        cache: LocationCache,
        fetcher: Arc<dyn ProfileFetcher>,
        config: ResolverConfig,
    ) -> Self {
        let backoff = BackoffTracker::new(
            config.base_backoff,
            config.max_backoff,
            config.max_retries,
        );
        let governor = RateGovernor::new(config.min_request_interval, config.rate_limit_cooldown);
        let slots = Arc::new(Semaphore::new(config.max_concurrent_fetches));

        Self {
            inner: Arc::new(ResolverInner {
                config,
                cache,
                fetcher,
                backoff: Mutex::new(backoff),
                governor,
                pending: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                slots,
                draining: AtomicBool::new(false),
                warm_kicked: AtomicBool::new(false),
            }),
        }
    }

    /// Get the resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &LocationCache {
        &self.inner.cache
    }

    /// Run the one-shot cache warm now instead of in the background.
    pub async fn warm_cache(&self) {
        self.inner.warm_kicked.store(true, Ordering::Release);
        self.inner.cache.warm_from_store().await;
    }

    /// Resolve a raw handle to its profile location.
    ///
    /// Returns `None` for invalid handles, known-absent profiles, and
    /// every failure mode; failures are never surfaced as errors. The call
    /// suspends while a lookup is in flight - its own, or one it shares
    /// with a concurrent caller asking for the same handle.
    pub async fn resolve(&self, raw: &str) -> Option<Location> {
        let username = match Username::parse(raw) {
            Ok(username) => username,
            Err(e) => {
                tracing::debug!(raw, error = %e, "rejecting lookup for invalid handle");
                return None;
            }
        };
        self.resolve_username(username).await
    }

    /// [`resolve`](Self::resolve) for an already-validated handle.
    pub async fn resolve_username(&self, username: Username) -> Option<Location> {
        let inner = &self.inner;
        self.kick_warm();

        // Memory tier first; a fresh positive or negative is terminal.
        if let Some(cached) = inner.cache.get(&username).await {
            return cached.into_location();
        }

        // Inside the backoff window: refuse without enqueueing.
        if inner
            .backoff
            .lock()
            .await
            .is_blocked(&username, Instant::now())
        {
            tracing::debug!(username = %username, "lookup suppressed by backoff");
            return None;
        }

        // Cold-cache fallback: probe the durable tier for this one key
        // until the warm sweep has completed.
        if !inner.cache.is_warmed() {
            if let Some(cached) = inner.cache.probe_durable(&username).await {
                return cached.into_location();
            }
        }

        // Share an in-flight lookup, or claim the slot and enqueue.
        let mut outcome_rx = {
            let mut pending = inner.pending.lock().await;
            match pending.entry(username.clone()) {
                Entry::Occupied(occupied) => occupied.get().subscribe(),
                Entry::Vacant(vacant) => {
                    if inner.backoff.lock().await.retries_exhausted(&username) {
                        tracing::debug!(username = %username, "retry budget exhausted, refusing lookup");
                        return None;
                    }
                    let (tx, rx) = broadcast::channel(1);
                    vacant.insert(tx);
                    inner.queue.lock().await.push_back(username.clone());
                    rx
                }
            }
        };

        self.ensure_dispatcher();

        match outcome_rx.recv().await {
            Ok(outcome) => outcome,
            // Sender dropped without settling (shutdown); report no value.
            Err(_) => None,
        }
    }

    /// Remove expired records from the durable store.
    ///
    /// Exposed for callers that schedule maintenance themselves; most
    /// deployments run `whereabouts_storage::sweeper_task` instead.
    pub async fn sweep_expired(&self) -> WhereaboutsResult<u64> {
        let store = self.inner.cache.store();
        sweep_expired(store.as_ref(), self.inner.cache.config().ttl).await
    }

    /// Start the background cache warm exactly once.
    fn kick_warm(&self) {
        if self
            .inner
            .warm_kicked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.cache.warm_from_store().await;
            });
        }
    }

    /// Start the admission loop if it is not already draining.
    fn ensure_dispatcher(&self) {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                ResolverInner::drain_queue(inner).await;
            });
        }
    }
}

impl Clone for Resolver {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ResolverInner {
    /// The admission loop. One instance drains the queue at a time.
    ///
    /// Per entry: claim an execution slot, then a governor admission, then
    /// launch. The governor admission is the last gate before launch, so
    /// dispatch starts are strictly ordered and spaced even when slot
    /// waits stall the loop.
    async fn drain_queue(inner: Arc<ResolverInner>) {
        loop {
            loop {
                let next = { inner.queue.lock().await.pop_front() };
                let Some(username) = next else { break };

                let permit = match Arc::clone(&inner.slots).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        // Semaphore closed: the process is tearing down.
                        inner.draining.store(false, Ordering::Release);
                        return;
                    }
                };

                inner.governor.admit().await;

                tracing::trace!(username = %username, "dispatching lookup");
                let task_inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    let outcome = task_inner.fetcher.fetch(&username).await;
                    task_inner.settle(&username, outcome).await;
                    drop(permit);
                });
            }

            inner.draining.store(false, Ordering::Release);
            // An enqueue may have raced the exit; reclaim the flag if so.
            if inner.queue.lock().await.is_empty() {
                break;
            }
            if inner
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                break;
            }
        }
    }

    /// Apply one settled outcome: bookkeeping first, then hand the result
    /// to every waiting caller and retire the pending entry.
    async fn settle(&self, username: &Username, outcome: FetchOutcome) {
        let resolved = match outcome {
            FetchOutcome::Found(location) => {
                self.backoff.lock().await.clear(username);
                self.cache
                    .put(username, CachedLocation::Found(location.clone()))
                    .await;
                tracing::debug!(username = %username, location = %location, "lookup resolved");
                Some(location)
            }
            FetchOutcome::NotFound => {
                self.backoff.lock().await.clear(username);
                self.cache.put(username, CachedLocation::Absent).await;
                tracing::debug!(username = %username, "lookup settled with no location");
                None
            }
            FetchOutcome::RateLimited => {
                self.governor.notify_rate_limited().await;
                let delay = self
                    .backoff
                    .lock()
                    .await
                    .record_failure(username, Instant::now());
                // In-memory negative only: never persisted.
                self.cache
                    .put_memory_only(username, CachedLocation::Absent)
                    .await;
                tracing::debug!(
                    username = %username,
                    backoff_ms = delay.as_millis() as u64,
                    "lookup rate limited"
                );
                None
            }
            FetchOutcome::TransientFailure => {
                let delay = self
                    .backoff
                    .lock()
                    .await
                    .record_failure(username, Instant::now());
                tracing::debug!(
                    username = %username,
                    backoff_ms = delay.as_millis() as u64,
                    "lookup failed transiently"
                );
                None
            }
        };

        // The cache already holds the settlement, so a caller that misses
        // the pending entry here still observes the outcome.
        let mut pending = self.pending.lock().await;
        if let Some(tx) = pending.remove(username) {
            let _ = tx.send(resolved);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
