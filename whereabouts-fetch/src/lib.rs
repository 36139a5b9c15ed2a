//! WHEREABOUTS Fetch - Profile Fetcher Abstraction
//!
//! Defines the collaborator interface the resolution pipeline calls to
//! look a profile up remotely, the outcome taxonomy it consumes, and the
//! concrete client for X's about-page GraphQL endpoint. The pipeline never
//! sees protocol details; it only acts on the [`FetchOutcome`].

pub mod client;
mod types;

pub use client::{AboutPageClient, ClientAuth};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use whereabouts_core::{Location, Username};

// ============================================================================
// FETCH OUTCOME
// ============================================================================

/// Settled outcome of one remote lookup attempt.
///
/// This is deliberately not a `Result`: every variant is a normal, expected
/// settlement and the pipeline stays total over all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The profile reports this (already sanitized) location.
    Found(Location),
    /// The lookup completed and the profile has no usable location. Final
    /// and cacheable.
    NotFound,
    /// The service signalled a shared-quota limit (HTTP 429 equivalent).
    /// Pauses all dispatch, not just this username.
    RateLimited,
    /// The attempt failed for this username only (transport error, bad
    /// status, unparseable body). Retryable after per-username backoff.
    TransientFailure,
}

// ============================================================================
// FETCHER TRAIT
// ============================================================================

/// Remote lookup collaborator.
///
/// Implementations own all protocol, authentication, and response-parsing
/// details, and must be thread-safe: the dispatcher runs several fetches
/// concurrently (never two for the same username).
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Attempt one remote lookup for a username.
    async fn fetch(&self, username: &Username) -> FetchOutcome;
}

// ============================================================================
// MOCK FETCHER FOR TESTING
// ============================================================================

/// Scriptable [`ProfileFetcher`] for tests.
///
/// Outcomes are scripted per username and consumed in order; unscripted
/// lookups settle `NotFound`. The mock instruments every call with
/// counters, start times, and a live-concurrency gauge so tests can assert
/// the pipeline's dedup, spacing, and concurrency properties.
pub struct MockFetcher {
    scripts: Mutex<HashMap<Username, VecDeque<FetchOutcome>>>,
    latency: Duration,
    total_calls: AtomicU64,
    calls: Mutex<HashMap<Username, u64>>,
    start_times: Mutex<Vec<Instant>>,
    live: AtomicUsize,
    peak_live: AtomicUsize,
}

impl MockFetcher {
    /// Create a mock that settles every lookup `NotFound` instantly.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            total_calls: AtomicU64::new(0),
            calls: Mutex::new(HashMap::new()),
            start_times: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            peak_live: AtomicUsize::new(0),
        }
    }

    /// Simulate a remote round trip of the given duration.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Script the outcomes for a username, consumed one per call.
    pub fn script(&self, username: &Username, outcomes: impl IntoIterator<Item = FetchOutcome>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts
                .entry(username.clone())
                .or_default()
                .extend(outcomes);
        }
    }

    /// Total lookups observed.
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Lookups observed for one username.
    pub fn calls_for(&self, username: &Username) -> u64 {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.get(username).copied())
            .unwrap_or(0)
    }

    /// Start instant of every lookup, in call order.
    pub fn start_times(&self) -> Vec<Instant> {
        self.start_times.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Highest number of lookups that were ever in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_live.load(Ordering::Relaxed)
    }

    fn next_outcome(&self, username: &Username) -> FetchOutcome {
        self.scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(username).and_then(|queue| queue.pop_front()))
            .unwrap_or(FetchOutcome::NotFound)
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileFetcher for MockFetcher {
    async fn fetch(&self, username: &Username) -> FetchOutcome {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(username.clone()).or_insert(0) += 1;
        }
        if let Ok(mut start_times) = self.start_times.lock() {
            start_times.push(Instant::now());
        }

        let live_now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(live_now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.live.fetch_sub(1, Ordering::SeqCst);
        self.next_outcome(username)
    }
}

impl std::fmt::Debug for MockFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFetcher")
            .field("latency", &self.latency)
            .field("total_calls", &self.total_calls())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn username(raw: &str) -> Username {
        Username::parse(raw).expect("valid handle")
    }

    #[tokio::test]
    async fn test_mock_default_outcome_is_not_found() {
        let fetcher = MockFetcher::new();
        let outcome = fetcher.fetch(&username("alice")).await;
        assert_eq!(outcome, FetchOutcome::NotFound);
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_scripts_consume_in_order() {
        let fetcher = MockFetcher::new();
        let alice = username("alice");
        fetcher.script(
            &alice,
            [
                FetchOutcome::TransientFailure,
                FetchOutcome::Found(Location::sanitize("Paris").expect("valid")),
            ],
        );

        assert_eq!(fetcher.fetch(&alice).await, FetchOutcome::TransientFailure);
        assert_eq!(
            fetcher.fetch(&alice).await,
            FetchOutcome::Found(Location::sanitize("Paris").expect("valid"))
        );
        // Script exhausted: falls back to the default.
        assert_eq!(fetcher.fetch(&alice).await, FetchOutcome::NotFound);
        assert_eq!(fetcher.calls_for(&alice), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_tracks_concurrency() {
        use std::sync::Arc;

        let fetcher = Arc::new(MockFetcher::new().with_latency(Duration::from_millis(100)));
        let mut handles = Vec::new();
        for i in 0..4 {
            let fetcher = Arc::clone(&fetcher);
            let user = username(&format!("user{i}"));
            handles.push(tokio::spawn(async move {
                fetcher.fetch(&user).await;
            }));
        }
        for handle in handles {
            handle.await.expect("fetch task");
        }

        assert_eq!(fetcher.total_calls(), 4);
        assert!(fetcher.peak_concurrency() >= 2);
        assert_eq!(fetcher.start_times().len(), 4);
    }
}
