//! Error types for vault operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while operating on a vault.
#[derive(Error, Debug)]
pub enum VaultError {
    /// No vault exists at the given path.
    #[error("No vault found at {path}")]
    NotInitialized {
        /// Where a vault was expected.
        path: PathBuf,
    },

    /// A vault already exists where one would be created.
    #[error("A vault already exists at {path}")]
    AlreadyExists {
        /// The occupied path.
        path: PathBuf,
    },

    /// Stored vault state is inconsistent.
    #[error("Vault is corrupt: {reason}")]
    Corrupt {
        /// What failed the consistency check.
        reason: String,
    },

    /// Filesystem operation failed.
    #[error("Vault I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON could not be (de)serialized.
    #[error("Vault state (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key material failed a cryptographic check.
    #[error(transparent)]
    Crypto(#[from] courier_crypto::CryptoError),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
