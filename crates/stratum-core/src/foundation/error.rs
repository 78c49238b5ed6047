//! Unified error types for the Stratum core.
//!
//! Store errors are split into two kinds: `StoreUnavailable` is transient and
//! worth retrying, `StoreMalformed` is a configuration bug and is not.
//! A missing attribute is routine and only becomes an error through
//! [`ResolutionEngine::require`](crate::ResolutionEngine::require).

use thiserror::Error;

// =============================================================================
// Overlay Errors
// =============================================================================

/// Errors produced while loading or resolving overlay layers.
#[derive(Debug, Clone, Error)]
pub enum OverlayError {
    /// The store could not be reached, or a request to it timed out.
    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        /// Reason for failure.
        reason: String,
    },

    /// A store entry could not be decoded into the expected shape.
    #[error("malformed store entry '{key}': {reason}")]
    StoreMalformed {
        /// The offending key.
        key: String,
        /// Reason for failure.
        reason: String,
    },

    /// No layer defines the requested attribute.
    #[error("attribute '{0}' not found")]
    AttributeNotFound(String),

    /// The resolved value does not fit the requested type.
    #[error("failed to decode attribute '{name}': {reason}")]
    Decode {
        /// The attribute that was requested.
        name: String,
        /// Reason for failure.
        reason: String,
    },
}

impl OverlayError {
    /// Creates a store unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a malformed entry error.
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreMalformed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors a later retry may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        Self::unavailable(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(OverlayError::unavailable("connection refused").is_transient());
        assert!(!OverlayError::malformed("/config/dev/x", "not json").is_transient());
        assert!(!OverlayError::AttributeNotFound("x".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = OverlayError::malformed("/config/dev/x", "expected value");
        assert_eq!(
            err.to_string(),
            "malformed store entry '/config/dev/x': expected value"
        );
    }
}
