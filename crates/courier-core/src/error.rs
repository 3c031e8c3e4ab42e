//! Error type aggregating the workflow crates.

use thiserror::Error;

/// Errors surfaced by courier workflows.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Vault operation failed.
    #[error(transparent)]
    Vault(#[from] courier_vault::VaultError),

    /// Relay operation failed.
    #[error(transparent)]
    Relay(#[from] courier_relay::RelayError),

    /// Message construction or validation failed.
    #[error(transparent)]
    Protocol(#[from] courier_protocol::ProtocolError),

    /// Cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] courier_crypto::CryptoError),

    /// Encryption was requested but the recipient advertises no
    /// encryption key. Terminal: courier never falls back to
    /// plaintext silently.
    #[error("Recipient {recipient} has no encryption key; cannot send encrypted")]
    MissingEncryptionKey {
        /// The recipient that lacks a key.
        recipient: String,
    },
}

impl CoreError {
    /// Whether retrying later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Relay(e) if e.is_retryable())
    }
}

/// Result type for courier workflows.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_side_relay_failure_is_retryable() {
        // Keeps the poll loop alive across relay hiccups.
        let error = CoreError::Relay(courier_relay::RelayError::Rejected {
            status: 502,
            message: "bad gateway".into(),
            code: None,
        });
        assert!(error.is_retryable());
    }

    #[test]
    fn test_client_rejection_is_terminal() {
        let error = CoreError::Relay(courier_relay::RelayError::Rejected {
            status: 413,
            message: "message too large".into(),
            code: Some("too_large".into()),
        });
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_missing_encryption_key_is_terminal() {
        let error = CoreError::MissingEncryptionKey {
            recipient: "vault_x".into(),
        };
        assert!(!error.is_retryable());
    }
}
