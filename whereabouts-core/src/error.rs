//! Error types for whereabouts operations.
//!
//! The resolution entry point itself never surfaces these to callers
//! (failed lookups degrade to "no value"); they exist for the storage and
//! maintenance surfaces, where the caller can act on them.

use thiserror::Error;

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to open store environment: {reason}")]
    EnvOpen { reason: String },

    #[error("Failed to open store database: {reason}")]
    DbOpen { reason: String },

    #[error("Store transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Failed to encode record for {username}: {reason}")]
    Encode { username: String, reason: String },

    #[error("Failed to decode record under key {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Store I/O error: {reason}")]
    Io { reason: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid username {raw:?}: {reason}")]
    InvalidUsername { raw: String, reason: String },
}

/// Master error type for all whereabouts errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WhereaboutsError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for whereabouts operations.
pub type WhereaboutsResult<T> = Result<T, WhereaboutsError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Transaction {
            reason: "mdb_txn_begin failed".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("transaction failed"));
        assert!(msg.contains("mdb_txn_begin"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidUsername {
            raw: "a/b".to_string(),
            reason: "must be 1-15 alphanumeric or underscore characters".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("a/b"));
        assert!(msg.contains("alphanumeric"));
    }

    #[test]
    fn test_whereabouts_error_from_variants() {
        let store = WhereaboutsError::from(StoreError::Io {
            reason: "disk full".to_string(),
        });
        assert!(matches!(store, WhereaboutsError::Store(_)));

        let validation = WhereaboutsError::from(ValidationError::InvalidUsername {
            raw: String::new(),
            reason: "empty".to_string(),
        });
        assert!(matches!(validation, WhereaboutsError::Validation(_)));
    }
}
