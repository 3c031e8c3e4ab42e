//! Error types for relay operations.

use thiserror::Error;

/// Errors that can occur while talking to a relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The relay could not be reached: connection refused, DNS failure
    /// or timeout. Retryable.
    #[error("Relay unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    /// The requested name or resource does not exist on the relay.
    #[error("Not found on relay: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// The relay understood the request and refused it.
    #[error("Relay rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Relay-provided reason.
        message: String,
        /// Relay-provided machine code, when any.
        code: Option<String>,
    },

    /// The relay answered with something the client cannot parse.
    #[error("Invalid relay response: {0}")]
    InvalidResponse(String),

    /// Building the canonical request body failed.
    #[error(transparent)]
    Protocol(#[from] courier_protocol::ProtocolError),
}

impl RelayError {
    /// Classify a reqwest failure: decode errors are protocol-level,
    /// everything else means the relay is unreachable.
    pub(crate) fn transport(error: reqwest::Error) -> Self {
        if error.is_decode() {
            RelayError::InvalidResponse(error.to_string())
        } else {
            RelayError::Unavailable(error)
        }
    }

    /// Whether retrying later could plausibly succeed.
    ///
    /// Covers the relay being unreachable and server-side failures
    /// (5xx). A 4xx rejection means the request itself is bad and will
    /// not improve with time.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Unavailable(_) => true,
            RelayError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
