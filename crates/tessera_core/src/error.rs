//! Core error types for tessera.

use crate::canonical::EncodeError;
use thiserror::Error;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A value fell outside the canonical value universe
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    /// Hash mismatch
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Hash that was recorded
        expected: String,
        /// Hash that was recomputed
        actual: String,
    },

    /// Parse error
    #[error("Parse error: {message}")]
    ParseError {
        /// Parser message
        message: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Not found
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity
        kind: String,
        /// Requested identifier
        id: String,
    },

    /// Already exists
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Kind of entity
        kind: String,
        /// Conflicting identifier
        id: String,
    },

    /// Internal error (for unexpected errors)
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NotFound {
            kind: "Step".to_string(),
            id: "draft".to_string(),
        };
        assert_eq!(format!("{}", err), "Step not found: draft");
    }

    #[test]
    fn test_hash_mismatch_error() {
        let err = CoreError::HashMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let s = format!("{}", err);
        assert!(s.contains("abc123"));
        assert!(s.contains("def456"));
    }

    #[test]
    fn test_encode_error_converts() {
        let err: CoreError = EncodeError::NonFinite.into();
        assert!(matches!(err, CoreError::Encoding(EncodeError::NonFinite)));
        assert!(err.to_string().starts_with("Encoding failed"));
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::ParseError { .. }));
    }
}
