//! Error types for the pattern store
//!
//! All components resolve internal failures to `PatternError` at their
//! boundaries. We use `thiserror` for automatic `Display` and `Error`
//! trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for pattern store operations
pub type PatternResult<T> = std::result::Result<T, PatternError>;

/// Errors returned by the pattern store
#[derive(Debug, Error)]
pub enum PatternError {
    /// Vector dimension doesn't match the index configuration
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension configured for the index
        expected: usize,
        /// Dimension of the provided vector
        got: usize,
    },

    /// Vector contains values the index cannot order (NaN, infinity)
    #[error("Invalid vector: {reason}")]
    InvalidVector {
        /// Why the vector was rejected
        reason: String,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (snapshot files, config files)
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Snapshot was corrupt or incompatible
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Operation conflicts with the current state (restore already ran,
    /// fingerprint already carried by a live node)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PatternError {
    /// Check if this error was raised by call-boundary validation
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            PatternError::DimensionMismatch { .. } | PatternError::InvalidVector { .. }
        )
    }

    /// Check if this error indicates an unusable snapshot
    pub fn is_snapshot_error(&self) -> bool {
        matches!(self, PatternError::Snapshot(_))
    }
}

impl From<io::Error> for PatternError {
    fn from(e: io::Error) -> Self {
        PatternError::Io(e.to_string())
    }
}
