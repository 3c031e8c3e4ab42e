//! X25519 key exchange for payload confidentiality.
//!
//! Each vault holds a static exchange key pair; every sealed payload
//! additionally uses a fresh ephemeral pair on the sender side, so
//! recorded ciphertext cannot be opened with the sender's long-term keys.
//!
//! ## Security Notes
//!
//! - Private keys and shared secrets are zeroized on drop
//! - Shared secrets feed a KDF, never the cipher directly

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{encoding, CryptoError, Result};

/// Size of an X25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an X25519 private key in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// X25519 public key advertised in an agent's registry entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionPublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl EncryptionPublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse from the URL-safe base64 wire encoding.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_bytes(&encoding::decode(encoded)?)
    }

    /// Get the key as bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    /// Encode for the wire.
    pub fn to_base64(&self) -> String {
        encoding::encode(&self.bytes)
    }
}

impl std::fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncryptionPublicKey({:02x}{:02x}..)",
            self.bytes[0], self.bytes[1]
        )
    }
}

impl From<PublicKey> for EncryptionPublicKey {
    fn from(key: PublicKey) -> Self {
        Self {
            bytes: key.to_bytes(),
        }
    }
}

impl From<&EncryptionPublicKey> for PublicKey {
    fn from(key: &EncryptionPublicKey) -> Self {
        PublicKey::from(key.bytes)
    }
}

/// Long-term X25519 private key held by the vault.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionPrivateKey {
    bytes: [u8; PRIVATE_KEY_SIZE],
}

impl EncryptionPrivateKey {
    /// Generate a new random private key.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self {
            bytes: secret.to_bytes(),
        }
    }

    /// Create from raw bytes.
    ///
    /// # Security
    ///
    /// Only use bytes from a secure source.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PRIVATE_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PRIVATE_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> EncryptionPublicKey {
        let secret = StaticSecret::from(self.bytes);
        EncryptionPublicKey::from(PublicKey::from(&secret))
    }

    /// Agree a shared secret with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &EncryptionPublicKey) -> SharedSecret {
        let secret = StaticSecret::from(self.bytes);
        let shared = secret.diffie_hellman(&PublicKey::from(peer_public));
        SharedSecret {
            bytes: shared.to_bytes(),
        }
    }

    /// Get raw bytes (for vault persistence).
    ///
    /// # Security
    ///
    /// Handle with care - this exposes the private key.
    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionPrivateKey([REDACTED])")
    }
}

// Clone intentionally NOT implemented for EncryptionPrivateKey.

/// Single-use X25519 key pair; the secret half dies with the exchange.
pub struct EphemeralExchange {
    secret: EphemeralSecret,
    public: EncryptionPublicKey,
}

impl EphemeralExchange {
    /// Generate a fresh ephemeral pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public: EncryptionPublicKey::from(public),
        }
    }

    /// Get the public half, sent alongside the ciphertext.
    pub fn public_key(&self) -> &EncryptionPublicKey {
        &self.public
    }

    /// Agree a shared secret and consume the ephemeral key.
    pub fn diffie_hellman(self, peer_public: &EncryptionPublicKey) -> SharedSecret {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer_public));
        SharedSecret {
            bytes: shared.to_bytes(),
        }
    }
}

impl std::fmt::Debug for EphemeralExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EphemeralExchange {{ public: {:?} }}", self.public)
    }
}

/// Shared secret from a Diffie-Hellman exchange.
///
/// Input to a KDF, never an encryption key itself.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    /// Derive a 256-bit key using BLAKE3 key derivation under `context`.
    pub fn derive_key(&self, context: &str) -> [u8; 32] {
        blake3::derive_key(context, &self.bytes)
    }

    /// Get the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}
