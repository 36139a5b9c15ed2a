//! Per-username failure tracking with exponential backoff.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use whereabouts_core::Username;

/// Failure record for one username.
#[derive(Debug, Clone)]
struct BackoffState {
    /// Consecutive failures since the last successful settlement.
    failures: u32,
    /// Lookups for this username are refused before this instant.
    blocked_until: Instant,
}

/// Tracks consecutive failures per username and imposes an exponentially
/// growing cooldown on retries.
///
/// The tracker is pure bookkeeping: callers pass `now` explicitly and
/// decide what "blocked" means. Absence from the map is the same as zero
/// recorded failures. `blocked_until` never moves backwards for a username
/// until a success removes the record entirely.
#[derive(Debug)]
pub struct BackoffTracker {
    /// Backoff after the first failure.
    base: Duration,
    /// Backoff ceiling.
    cap: Duration,
    /// Failures after which retries are refused outright.
    max_retries: u32,
    /// Per-username failure state.
    states: HashMap<Username, BackoffState>,
}

impl BackoffTracker {
    /// Create a tracker.
    ///
    /// # Arguments
    /// * `base` - backoff after the first failure
    /// * `cap` - backoff ceiling
    /// * `max_retries` - failures after which retries are refused outright
    pub fn new(base: Duration, cap: Duration, max_retries: u32) -> Self {
        Self {
            base,
            cap,
            max_retries,
            states: HashMap::new(),
        }
    }

    /// Whether the username is inside its backoff window as of `now`.
    pub fn is_blocked(&self, username: &Username, now: Instant) -> bool {
        self.states
            .get(username)
            .map(|state| now < state.blocked_until)
            .unwrap_or(false)
    }

    /// Whether the username has exhausted its retry budget.
    ///
    /// Unlike [`is_blocked`](Self::is_blocked) this never expires: an
    /// exhausted username is refused until a successful settlement calls
    /// [`clear`](Self::clear). This stops the pipeline hammering handles
    /// that structurally never resolve, not just momentarily unlucky ones.
    pub fn retries_exhausted(&self, username: &Username) -> bool {
        self.states
            .get(username)
            .map(|state| state.failures >= self.max_retries)
            .unwrap_or(false)
    }

    /// Recorded failure count for a username.
    pub fn failure_count(&self, username: &Username) -> u32 {
        self.states
            .get(username)
            .map(|state| state.failures)
            .unwrap_or(0)
    }

    /// Record a failed settlement and compute the new backoff window.
    ///
    /// The window is `base * 2^(failures-1)` capped at `cap`: with the
    /// defaults, 2s, 4s, 8s, 16s, 32s, 60s, 60s, ... Returns the delay
    /// applied, for logging.
    pub fn record_failure(&mut self, username: &Username, now: Instant) -> Duration {
        let state = self
            .states
            .entry(username.clone())
            .or_insert(BackoffState {
                failures: 0,
                blocked_until: now,
            });

        state.failures = state.failures.saturating_add(1);
        // Exponent clamped so the shift cannot overflow; the cap dominates
        // far earlier anyway.
        let exponent = state.failures.saturating_sub(1).min(20);
        let delay = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.cap);

        let until = now + delay;
        if until > state.blocked_until {
            state.blocked_until = until;
        }
        delay
    }

    /// Forget all failure state for a username, restoring its full retry
    /// budget. Called only on successful settlements.
    pub fn clear(&mut self, username: &Username) {
        self.states.remove(username);
    }

    /// Number of usernames currently carrying failure state.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================


// =============================================================================
// PROPERTY-BASED TESTS
// =============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Successive failure delays never decrease and never exceed the cap.
        #[test]
        fn prop_delays_monotone_and_capped(
            failures in 1usize..40,
            base_ms in 1u64..5_000,
            cap_ms in 5_000u64..120_000,
        ) {
            let mut tracker = BackoffTracker::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(cap_ms),
                3,
            );
            let user = Username::parse("prop_user").expect("valid handle");
            let now = Instant::now();

            let mut previous = Duration::ZERO;
            for _ in 0..failures {
                let delay = tracker.record_failure(&user, now);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= Duration::from_millis(cap_ms));
                previous = delay;
            }
        }

        /// Failure count always matches the number of recorded failures
        /// until cleared, and clearing fully resets.
        #[test]
        fn prop_count_tracks_and_clear_resets(failures in 1u32..20) {
            let mut tracker = BackoffTracker::new(
                Duration::from_secs(2),
                Duration::from_secs(60),
                3,
            );
            let user = Username::parse("prop_user").expect("valid handle");
            let now = Instant::now();

            for _ in 0..failures {
                tracker.record_failure(&user, now);
            }
            prop_assert_eq!(tracker.failure_count(&user), failures);

            tracker.clear(&user);
            prop_assert_eq!(tracker.failure_count(&user), 0);
            prop_assert!(!tracker.retries_exhausted(&user));
        }
    }
}
