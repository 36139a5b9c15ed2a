//! Resolver pipeline configuration.

use std::time::Duration;

/// Default minimum spacing between dispatched lookups: 300ms.
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 300;

/// Default bound on concurrently executing lookups.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 3;

/// Default per-username retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base backoff after a first failure: 2 seconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 2_000;

/// Default backoff ceiling: 60 seconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

/// Default global cooldown after a rate-limit signal: 30 seconds.
pub const DEFAULT_RATE_LIMIT_COOLDOWN_MS: u64 = 30_000;

/// Configuration for the resolution pipeline.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Minimum spacing between dispatch starts (default: 300ms).
    pub min_request_interval: Duration,

    /// Maximum concurrently executing lookups (default: 3).
    pub max_concurrent_fetches: usize,

    /// Failures after which a username is refused outright until a
    /// successful settlement clears it (default: 3).
    pub max_retries: u32,

    /// Backoff after the first failure; doubles per failure (default: 2s).
    pub base_backoff: Duration,

    /// Backoff ceiling (default: 60s).
    pub max_backoff: Duration,

    /// Dispatch pause after the service signals a shared-quota limit
    /// (default: 30s).
    pub rate_limit_cooldown: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_millis(DEFAULT_MIN_REQUEST_INTERVAL_MS),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            rate_limit_cooldown: Duration::from_millis(DEFAULT_RATE_LIMIT_COOLDOWN_MS),
        }
    }
}

impl ResolverConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum spacing between dispatch starts.
    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    /// Set the concurrent-lookup bound.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max.max(1);
        self
    }

    /// Set the per-username retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base and ceiling.
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = cap;
        self
    }

    /// Set the global rate-limit cooldown.
    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    /// Create ResolverConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `WHEREABOUTS_MIN_REQUEST_INTERVAL_MS` (default: 300)
    /// - `WHEREABOUTS_MAX_CONCURRENT_FETCHES` (default: 3)
    /// - `WHEREABOUTS_MAX_RETRIES` (default: 3)
    /// - `WHEREABOUTS_BASE_BACKOFF_MS` (default: 2000)
    /// - `WHEREABOUTS_MAX_BACKOFF_MS` (default: 60000)
    /// - `WHEREABOUTS_RATE_LIMIT_COOLDOWN_MS` (default: 30000)
    pub fn from_env() -> Self {
        fn env_u64(name: &str, default: u64) -> u64 {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        }

        Self {
            min_request_interval: Duration::from_millis(env_u64(
                "WHEREABOUTS_MIN_REQUEST_INTERVAL_MS",
                DEFAULT_MIN_REQUEST_INTERVAL_MS,
            )),
            max_concurrent_fetches: env_u64(
                "WHEREABOUTS_MAX_CONCURRENT_FETCHES",
                DEFAULT_MAX_CONCURRENT_FETCHES as u64,
            )
            .max(1) as usize,
            max_retries: env_u64("WHEREABOUTS_MAX_RETRIES", DEFAULT_MAX_RETRIES as u64) as u32,
            base_backoff: Duration::from_millis(env_u64(
                "WHEREABOUTS_BASE_BACKOFF_MS",
                DEFAULT_BASE_BACKOFF_MS,
            )),
            max_backoff: Duration::from_millis(env_u64(
                "WHEREABOUTS_MAX_BACKOFF_MS",
                DEFAULT_MAX_BACKOFF_MS,
            )),
            rate_limit_cooldown: Duration::from_millis(env_u64(
                "WHEREABOUTS_RATE_LIMIT_COOLDOWN_MS",
                DEFAULT_RATE_LIMIT_COOLDOWN_MS,
            )),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ResolverConfig::default();
        assert_eq!(config.min_request_interval, Duration::from_millis(300));
        assert_eq!(config.max_concurrent_fetches, 3);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_backoff, Duration::from_secs(2));
        assert_eq!(config.max_backoff, Duration::from_secs(60));
        assert_eq!(config.rate_limit_cooldown, Duration::from_secs(30));
    }

    #[test]
    fn test_config_builder() {
        let config = ResolverConfig::new()
            .with_min_request_interval(Duration::from_millis(50))
            .with_max_concurrent_fetches(8)
            .with_max_retries(5)
            .with_backoff(Duration::from_millis(100), Duration::from_secs(5))
            .with_rate_limit_cooldown(Duration::from_secs(10));

        assert_eq!(config.min_request_interval, Duration::from_millis(50));
        assert_eq!(config.max_concurrent_fetches, 8);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_backoff, Duration::from_millis(100));
        assert_eq!(config.max_backoff, Duration::from_secs(5));
        assert_eq!(config.rate_limit_cooldown, Duration::from_secs(10));
    }

    #[test]
    fn test_concurrency_bound_is_at_least_one() {
        let config = ResolverConfig::new().with_max_concurrent_fetches(0);
        assert_eq!(config.max_concurrent_fetches, 1);
    }
}
