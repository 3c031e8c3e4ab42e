//! Sealed payloads: ephemeral X25519 + XChaCha20-Poly1305.
//!
//! `seal` encrypts a payload so that only the holder of the recipient's
//! exchange private key can open it. The sender derives a one-off AEAD
//! key from an ephemeral Diffie-Hellman exchange; the ephemeral public
//! half travels with the ciphertext.
//!
//! ## Security Notes
//!
//! - A fresh ephemeral key per payload; nothing links two sealed blobs
//! - Random 192-bit nonces, safe to generate per message
//! - Opening distinguishes a structurally broken blob
//!   (`MalformedCiphertext`) from an authentication failure
//!   (`Decryption`, covering both wrong key and tampering)

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::exchange::{EncryptionPrivateKey, EncryptionPublicKey, EphemeralExchange};
use crate::{encoding, CryptoError, Result};

/// Size of the XChaCha20 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// KDF domain context for sealed payload keys.
const PAYLOAD_KEY_CONTEXT: &str = "courier sealed payload v1";

/// A sealed payload as it travels on the wire.
///
/// All three fields are padded URL-safe base64.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedPayload {
    /// Sender's single-use X25519 public key.
    pub ephemeral_public_key: String,
    /// Random XChaCha20 nonce.
    pub nonce: String,
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: String,
}

impl std::fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SealedPayload {{ ciphertext: {} b64 chars }}",
            self.ciphertext.len()
        )
    }
}

/// Seal `plaintext` for the holder of `recipient`.
pub fn seal(recipient: &EncryptionPublicKey, plaintext: &[u8]) -> Result<SealedPayload> {
    let ephemeral = EphemeralExchange::generate();
    let ephemeral_public = ephemeral.public_key().clone();

    let shared = ephemeral.diffie_hellman(recipient);
    let key = shared.derive_key(PAYLOAD_KEY_CONTEXT);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("XChaCha20-Poly1305 sealing failed".into()))?;

    Ok(SealedPayload {
        ephemeral_public_key: ephemeral_public.to_base64(),
        nonce: encoding::encode(&nonce),
        ciphertext: encoding::encode(&ciphertext),
    })
}

/// Open a sealed payload with the recipient's private key.
///
/// # Errors
///
/// - `MalformedCiphertext` when a field fails to decode or the blob is
///   too short to carry an authentication tag
/// - `InvalidKeyLength` / `InvalidNonceLength` when a decoded field has
///   the wrong size
/// - `Decryption` when authentication fails (wrong key or tampering)
pub fn open(recipient_key: &EncryptionPrivateKey, sealed: &SealedPayload) -> Result<Vec<u8>> {
    let ephemeral_bytes = encoding::decode(&sealed.ephemeral_public_key)
        .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
    let nonce_bytes = encoding::decode(&sealed.nonce)
        .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
    let ciphertext = encoding::decode(&sealed.ciphertext)
        .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;

    let ephemeral_public = EncryptionPublicKey::from_bytes(&ephemeral_bytes)?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_SIZE,
            actual: nonce_bytes.len(),
        });
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::MalformedCiphertext(format!(
            "ciphertext of {} bytes cannot carry a {TAG_SIZE}-byte tag",
            ciphertext.len()
        )));
    }

    let shared = recipient_key.diffie_hellman(&ephemeral_public);
    let key = shared.derive_key(PAYLOAD_KEY_CONTEXT);

    let cipher = XChaCha20Poly1305::new((&key).into());
    cipher
        .decrypt(XNonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption)
}
