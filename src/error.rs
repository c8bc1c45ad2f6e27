//! Error types for the compound cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Missing keys are never errors: lookups answer `None` and deletes are
/// no-ops. Broken aggregate bookkeeping is a bug in the engine and panics
/// instead of surfacing here.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Capacity expression could not be parsed
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    /// Construction options are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key path runs through a leaf or ends on a branch
    #[error("Key conflict: {0}")]
    KeyConflict(String),

    /// Size estimator failed to measure a value
    #[error("Size estimate failed: {0}")]
    SizeEstimate(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CacheError::InvalidCapacity("2XB".to_string());
        assert_eq!(err.to_string(), "Invalid capacity: 2XB");

        let err = CacheError::KeyConflict("(a, 1)".to_string());
        assert_eq!(err.to_string(), "Key conflict: (a, 1)");
    }

    #[test]
    fn test_size_estimate_from_serde() {
        let serde_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: CacheError = serde_err.into();
        assert!(matches!(err, CacheError::SizeEstimate(_)));
    }
}
