//! Ed25519 message signing.
//!
//! Signatures cover the canonical form of a message so that any relay or
//! recipient can check authenticity without trusting the transport.
//!
//! ## Security Notes
//!
//! - Private keys are zeroized on drop
//! - Verification is total: it returns `false` for malformed keys or
//!   signatures instead of erroring, so callers cannot confuse
//!   "unverifiable" with a transport failure

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{encoding, CryptoError, Result};

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 private key seed in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 public key used to verify message signatures.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl SigningPublicKey {
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

    /// Verify a signature over `message`.
    ///
    /// Returns `false` for any failure: invalid key material, malformed
    /// signature, or a genuine mismatch. Never panics, never errors.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&signature.bytes);
        key.verify(message, &sig).is_ok()
    }
}

impl std::fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SigningPublicKey({:02x}{:02x}..)",
            self.bytes[0], self.bytes[1]
        )
    }
}

/// Ed25519 private key. Lives inside the vault and never crosses its
/// boundary.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SigningPrivateKey {
    bytes: [u8; PRIVATE_KEY_SIZE],
}

impl SigningPrivateKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        Self {
            bytes: key.to_bytes(),
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
    pub fn public_key(&self) -> SigningPublicKey {
        let key = SigningKey::from_bytes(&self.bytes);
        SigningPublicKey {
            bytes: key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let key = SigningKey::from_bytes(&self.bytes);
        Signature {
            bytes: key.sign(message).to_bytes(),
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

impl std::fmt::Debug for SigningPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningPrivateKey([REDACTED])")
    }
}

// Clone intentionally NOT implemented for SigningPrivateKey: secret
// material must not silently multiply in memory.

/// A detached Ed25519 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; SIGNATURE_SIZE],
}

impl Signature {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignatureLength {
                expected: SIGNATURE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SIGNATURE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse from the URL-safe base64 wire encoding.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_bytes(&encoding::decode(encoded)?)
    }

    /// Get the signature as bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.bytes
    }

    /// Encode for the wire.
    pub fn to_base64(&self) -> String {
        encoding::encode(&self.bytes)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Signature({:02x}{:02x}..)",
            self.bytes[0], self.bytes[1]
        )
    }
}
