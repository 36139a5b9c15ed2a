//! Process-wide dispatch pacing and rate-limit cooldown.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct GovernorState {
    /// Instant the last lookup was admitted.
    last_dispatch: Option<Instant>,
    /// No lookup is admitted before this instant.
    cooldown_until: Option<Instant>,
}

/// Gates every dispatch behind two conditions: minimum spacing since the
/// previous dispatch, and no active shared-quota cooldown.
///
/// [`admit`](Self::admit) records the new dispatch instant inside the same
/// critical section that checks the conditions, so two concurrent admits
/// can never both observe enough spacing - the second sleeps.
#[derive(Debug)]
pub struct RateGovernor {
    /// Minimum spacing between admitted dispatches.
    min_interval: Duration,
    /// Pause applied to all dispatch after a rate-limit signal.
    cooldown: Duration,
    state: Mutex<GovernorState>,
}

impl RateGovernor {
    /// Create a governor.
    ///
    /// # Arguments
    /// * `min_interval` - minimum spacing between admitted dispatches
    /// * `cooldown` - pause applied after a rate-limit signal
    pub fn new(min_interval: Duration, cooldown: Duration) -> Self {
        Self {
            min_interval,
            cooldown,
            state: Mutex::new(GovernorState::default()),
        }
    }

    /// Suspend until dispatch is permitted, then claim the slot.
    ///
    /// Returns only after atomically recording the new dispatch instant;
    /// the caller may start its lookup immediately.
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                let mut earliest = now;
                if let Some(cooldown_until) = state.cooldown_until {
                    if cooldown_until > earliest {
                        earliest = cooldown_until;
                    }
                }
                if let Some(last_dispatch) = state.last_dispatch {
                    let spaced = last_dispatch + self.min_interval;
                    if spaced > earliest {
                        earliest = spaced;
                    }
                }

                if earliest <= now {
                    state.last_dispatch = Some(now);
                    return;
                }
                earliest - now
            };
            // Lock released while sleeping; conditions are re-checked on
            // wake because another admit or a new cooldown may have won.
            tokio::time::sleep(wait).await;
        }
    }

    /// Register a shared-quota signal: pause all dispatch for the
    /// configured cooldown. Extensions are monotone - a later signal never
    /// shortens an already-scheduled cooldown.
    pub async fn notify_rate_limited(&self) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + self.cooldown;
        let extended = match state.cooldown_until {
            Some(existing) if existing >= until => existing,
            _ => until,
        };
        state.cooldown_until = Some(extended);
        tracing::warn!(
            cooldown_ms = self.cooldown.as_millis() as u64,
            "rate limit signalled, pausing all dispatch"
        );
    }

    /// Whether a cooldown is active as of now.
    pub async fn in_cooldown(&self) -> bool {
        let state = self.state.lock().await;
        state
            .cooldown_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }
}

// =============================================================================
// TESTS
// =============================================================================
