//! Resolved location values and cache records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a location string after trimming.
pub const LOCATION_MAX_LEN: usize = 100;

/// Placeholder spellings the remote service uses for "no location".
const PLACEHOLDER_LOCATIONS: [&str; 3] = ["null", "undefined", "n/a"];

/// A sanitized location string as shown on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    /// Sanitize a raw location string.
    ///
    /// Trims whitespace, enforces 1..=[`LOCATION_MAX_LEN`] characters, and
    /// rejects placeholder spellings (`"null"`, `"undefined"`, `"n/a"`,
    /// case-insensitive). Returns `None` for every reject; callers treat
    /// that as "known absent" rather than as an error.
    pub fn sanitize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().count() > LOCATION_MAX_LEN {
            return None;
        }
        let lowered = trimmed.to_lowercase();
        if PLACEHOLDER_LOCATIONS.contains(&lowered.as_str()) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// The sanitized location text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the location text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Outcome of a completed resolution, as held by the cache.
///
/// `Absent` is the explicit negative: a lookup completed and found nothing.
/// It is distinct from a cache miss ("never attempted") and is cached with
/// the same TTL as a positive result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachedLocation {
    /// The profile reports this location.
    Found(Location),
    /// The profile was looked up and has no usable location.
    Absent,
}

impl CachedLocation {
    /// Build a cache value from an optional sanitized location.
    pub fn from_option(location: Option<Location>) -> Self {
        match location {
            Some(location) => Self::Found(location),
            None => Self::Absent,
        }
    }

    /// Convert into the caller-visible shape: `Some(location)` or `None`.
    pub fn into_location(self) -> Option<Location> {
        match self {
            Self::Found(location) => Some(location),
            Self::Absent => None,
        }
    }

    /// Returns true for the explicit negative.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// A durable cache record: the value plus when it was observed.
///
/// Records older than the cache TTL are treated as absent on read and are
/// purged by the sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLocation {
    /// The cached resolution outcome.
    pub value: CachedLocation,
    /// When the outcome was observed.
    pub observed_at: DateTime<Utc>,
}

impl StoredLocation {
    /// Create a record stamped with the current time.
    pub fn observed_now(value: CachedLocation) -> Self {
        Self {
            value,
            observed_at: Utc::now(),
        }
    }

    /// Age of this record relative to `now`.
    ///
    /// Future-dated records (clock skew) report zero age rather than
    /// underflowing.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        now.signed_duration_since(self.observed_at)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    /// Whether this record is still within `ttl` as of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        self.age(now) < ttl
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sanitize_trims() {
        let location = Location::sanitize("  Paris, France  ").expect("valid location");
        assert_eq!(location.as_str(), "Paris, France");
    }

    #[test]
    fn test_sanitize_rejects_empty_and_whitespace() {
        assert!(Location::sanitize("").is_none());
        assert!(Location::sanitize("   ").is_none());
    }

    #[test]
    fn test_sanitize_rejects_placeholders_case_insensitive() {
        assert!(Location::sanitize("null").is_none());
        assert!(Location::sanitize("NULL").is_none());
        assert!(Location::sanitize("undefined").is_none());
        assert!(Location::sanitize("N/A").is_none());
        assert!(Location::sanitize("n/a").is_none());
    }

    #[test]
    fn test_sanitize_rejects_overlong() {
        let raw = "x".repeat(LOCATION_MAX_LEN + 1);
        assert!(Location::sanitize(&raw).is_none());
        let raw = "x".repeat(LOCATION_MAX_LEN);
        assert!(Location::sanitize(&raw).is_some());
    }

    #[test]
    fn test_cached_location_round_trip() {
        let found = CachedLocation::Found(Location::sanitize("Berlin").expect("valid"));
        let json = serde_json::to_string(&found).expect("serialize");
        let back: CachedLocation = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, found);

        let json = serde_json::to_string(&CachedLocation::Absent).expect("serialize");
        let back: CachedLocation = serde_json::from_str(&json).expect("deserialize");
        assert!(back.is_absent());
    }

    #[test]
    fn test_stored_location_freshness() {
        let record = StoredLocation {
            value: CachedLocation::Absent,
            observed_at: Utc::now() - chrono::Duration::hours(25),
        };
        assert!(!record.is_fresh(Utc::now(), Duration::from_secs(24 * 60 * 60)));

        let record = StoredLocation::observed_now(CachedLocation::Absent);
        assert!(record.is_fresh(Utc::now(), Duration::from_secs(24 * 60 * 60)));
    }

    #[test]
    fn test_stored_location_future_dated_age_is_zero() {
        let record = StoredLocation {
            value: CachedLocation::Absent,
            observed_at: Utc::now() + chrono::Duration::hours(1),
        };
        assert_eq!(record.age(Utc::now()), Duration::ZERO);
    }
}

// =============================================================================
// PROPERTY-BASED TESTS
// =============================================================================
