//! Cache Sweeper Background Task
//!
//! Periodically enumerates the durable store and removes location records
//! that have outlived the cache TTL, plus any records that no longer
//! decode. Lookup traffic never depends on the sweeper; it only bounds the
//! store's size and keeps enumeration-driven warms cheap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use whereabouts_core::{Username, WhereaboutsResult};

use crate::cache::DEFAULT_CACHE_TTL_SECS;
use crate::store::LocationStore;

/// Default sweep cadence: hourly.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the sweeper background task.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to sweep (default: 1 hour).
    pub sweep_interval: Duration,

    /// Age past which a record is purged. Must match the cache TTL or the
    /// sweeper will purge records the cache still trusts (default: 24 hours).
    pub ttl: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl SweeperConfig {
    /// Create SweeperConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `WHEREABOUTS_SWEEP_INTERVAL_SECS`: sweep cadence (default: 3600)
    /// - `WHEREABOUTS_CACHE_TTL_SECS`: record TTL (default: 86400)
    pub fn from_env() -> Self {
        let sweep_interval = Duration::from_secs(
            std::env::var("WHEREABOUTS_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        );

        let ttl = Duration::from_secs(
            std::env::var("WHEREABOUTS_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
        );

        Self { sweep_interval, ttl }
    }

    /// Configuration for development/testing with short cycles.
    pub fn development() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10),
            ttl: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Metrics for sweeper activity.
#[derive(Debug, Default)]
pub struct SweeperMetrics {
    /// Total sweep cycles completed.
    pub sweep_cycles: AtomicU64,

    /// Total records removed since startup.
    pub records_removed: AtomicU64,

    /// Total errors encountered while sweeping.
    pub sweep_errors: AtomicU64,
}

impl SweeperMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> SweeperSnapshot {
        SweeperSnapshot {
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            records_removed: self.records_removed.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweeper metrics at a point in time.
#[derive(Debug, Clone)]
pub struct SweeperSnapshot {
    pub sweep_cycles: u64,
    pub records_removed: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// SWEEP OPERATION
// ============================================================================

/// Remove every record older than `ttl`, plus undecodable records.
///
/// Returns the number of records removed. Keys outside the location
/// namespace are never touched (the store's `enumerate` does not surface
/// them).
pub async fn sweep_expired(store: &dyn LocationStore, ttl: Duration) -> WhereaboutsResult<u64> {
    let entries = store.enumerate().await?;
    let now = Utc::now();

    let expired: Vec<Username> = entries
        .into_iter()
        .filter_map(|(username, record)| match record {
            // Undecodable records count as expired.
            None => Some(username),
            Some(record) if !record.is_fresh(now, ttl) => Some(username),
            Some(_) => None,
        })
        .collect();

    if expired.is_empty() {
        return Ok(0);
    }
    store.remove(&expired).await
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that sweeps the store on a fixed interval.
///
/// Runs until the shutdown signal is received. Sweep failures are counted
/// and logged but never abort the task.
///
/// # Arguments
///
/// * `store` - The durable store to sweep
/// * `config` - Sweep cadence and TTL
/// * `shutdown_rx` - Watch receiver for the shutdown signal
///
/// # Returns
///
/// Metrics collected during the task's lifetime.
///
/// # Example
///
/// ```ignore
/// use tokio::sync::watch;
///
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(sweeper_task(store, SweeperConfig::default(), shutdown_rx));
///
/// // Later, trigger shutdown.
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await.unwrap();
/// ```
pub async fn sweeper_task(
    store: Arc<dyn LocationStore>,
    config: SweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweeperMetrics> {
    let metrics = Arc::new(SweeperMetrics::new());

    let mut sweep_interval = interval(config.sweep_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The immediate first tick doubles as the startup sweep.

    tracing::info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        ttl_secs = config.ttl.as_secs(),
        "cache sweeper started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("cache sweeper shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
                match sweep_expired(store.as_ref(), config.ttl).await {
                    Ok(0) => {
                        tracing::trace!("sweep cycle completed with nothing to remove");
                    }
                    Ok(removed) => {
                        metrics.records_removed.fetch_add(removed, Ordering::Relaxed);
                        tracing::info!(removed, "sweep cycle removed expired records");
                    }
                    Err(e) => {
                        metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = %e, "sweep cycle failed");
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweep_cycles = snapshot.sweep_cycles,
        records_removed = snapshot.records_removed,
        sweep_errors = snapshot.sweep_errors,
        "cache sweeper stopped"
    );

    metrics
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLocationStore;
    use whereabouts_core::{CachedLocation, Location, StoredLocation};

    fn username(raw: &str) -> Username {
        Username::parse(raw).expect("valid handle")
    }

    fn fresh(raw: &str) -> StoredLocation {
        StoredLocation::observed_now(CachedLocation::Found(
            Location::sanitize(raw).expect("valid location"),
        ))
    }

    fn stale() -> StoredLocation {
        StoredLocation {
            value: CachedLocation::Absent,
            observed_at: Utc::now() - chrono::Duration::hours(25),
        }
    }

    #[test]
    fn test_config_default() {
        let config = SweeperConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.ttl, Duration::from_secs(86400));
    }

    #[test]
    fn test_config_development() {
        let config = SweeperConfig::development();
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = SweeperMetrics::new();
        metrics.sweep_cycles.store(4, Ordering::Relaxed);
        metrics.records_removed.store(9, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sweep_cycles, 4);
        assert_eq!(snapshot.records_removed, 9);
        assert_eq!(snapshot.sweep_errors, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = MemoryLocationStore::new();
        store.seed(username("fresh"), fresh("Madrid"));
        store.seed(username("stale"), stale());
        store.seed(username("older"), stale());

        let removed = sweep_expired(&store, Duration::from_secs(86400))
            .await
            .expect("sweep should succeed");
        assert_eq!(removed, 2);

        assert!(store.get(&username("fresh")).await.expect("get").is_some());
        assert!(store.get(&username("stale")).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_sweep_empty_store_is_noop() {
        let store = MemoryLocationStore::new();
        let removed = sweep_expired(&store, Duration::from_secs(86400))
            .await
            .expect("sweep should succeed");
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_sweep_propagates_store_errors() {
        let store = MemoryLocationStore::new();
        store.fail_reads(true);
        assert!(sweep_expired(&store, Duration::from_secs(86400))
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_cycles_and_shutdown() {
        let store = Arc::new(MemoryLocationStore::new());
        store.seed(username("stale"), stale());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = SweeperConfig {
            sweep_interval: Duration::from_secs(60),
            ttl: Duration::from_secs(86400),
        };

        let handle = tokio::spawn(sweeper_task(store.clone(), config, shutdown_rx));

        // First tick fires immediately; give the task a couple of cycles.
        tokio::time::sleep(Duration::from_secs(150)).await;

        shutdown_tx.send(true).expect("send shutdown");
        let metrics = handle.await.expect("task should join");

        let snapshot = metrics.snapshot();
        assert!(snapshot.sweep_cycles >= 2);
        assert_eq!(snapshot.records_removed, 1);
        assert!(store.get(&username("stale")).await.expect("get").is_none());
    }
}
