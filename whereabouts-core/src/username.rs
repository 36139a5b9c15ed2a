//! Normalized lookup keys.
//!
//! A [`Username`] is the only key type the pipeline accepts. Construction
//! goes through [`Username::parse`], which case-folds and validates, so
//! every downstream structure (cache, backoff table, pending table, queue)
//! can assume its keys are well-formed.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Maximum length of a username accepted by the remote service.
pub const USERNAME_MAX_LEN: usize = 15;

/// Handle grammar of the remote service: 1-15 chars, alphanumeric + underscore.
static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").expect("username pattern must compile"));

/// A validated, case-folded lookup key.
///
/// Two spellings of the same handle (`"Alice"`, `"alice"`) compare equal
/// after parsing, so concurrent lookups for either spelling share one
/// in-flight request and one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

impl Username {
    /// Parse and normalize a raw handle.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidUsername`] when the input is empty,
    /// longer than [`USERNAME_MAX_LEN`], or contains characters outside
    /// `[A-Za-z0-9_]`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if !USERNAME_PATTERN.is_match(raw) {
            return Err(ValidationError::InvalidUsername {
                raw: raw.to_string(),
                reason: format!(
                    "must be 1-{} alphanumeric or underscore characters",
                    USERNAME_MAX_LEN
                ),
            });
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// The normalized handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the normalized handle.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let username = Username::parse("JackDorsey").expect("valid handle");
        assert_eq!(username.as_str(), "jackdorsey");
    }

    #[test]
    fn test_parse_accepts_underscores_and_digits() {
        assert!(Username::parse("a_b_c_123").is_ok());
        assert!(Username::parse("_").is_ok());
        assert!(Username::parse("0").is_ok());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Username::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_too_long() {
        // 15 is the limit; 16 must fail.
        assert!(Username::parse(&"a".repeat(15)).is_ok());
        assert!(Username::parse(&"a".repeat(16)).is_err());
    }

    #[test]
    fn test_parse_rejects_path_segments() {
        assert!(Username::parse("a/b").is_err());
        assert!(Username::parse("home?x=1").is_err());
        assert!(Username::parse("name with space").is_err());
    }

    #[test]
    fn test_equal_after_folding() {
        let a = Username::parse("Alice").expect("valid handle");
        let b = Username::parse("alice").expect("valid handle");
        assert_eq!(a, b);
    }
}

// =============================================================================
// PROPERTY-BASED TESTS
// =============================================================================
