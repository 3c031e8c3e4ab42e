//! Error types for protocol operations.

use thiserror::Error;

/// Errors that can occur while building or validating messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A required envelope field is missing or inconsistent.
    #[error("Invalid envelope field '{field}': {reason}")]
    InvalidEnvelope {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The message exceeds the canonical-form size limit.
    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Canonical size of the message.
        size: usize,
        /// The enforced limit.
        limit: usize,
    },

    /// JSON (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
