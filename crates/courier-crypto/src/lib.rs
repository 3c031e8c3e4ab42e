//! Cryptographic primitives for courier.
//!
//! Two independent key pairs back every agent identity:
//!
//! - an Ed25519 signing pair for message authenticity
//! - an X25519 exchange pair for payload confidentiality
//!
//! Confidential payloads use a sealed-box construction: an ephemeral
//! X25519 key agrees a shared secret with the recipient's exchange key,
//! BLAKE3 derives the AEAD key under a domain context, and
//! XChaCha20-Poly1305 encrypts with a random 192-bit nonce.
//!
//! ## Security Notes
//!
//! - Private key material is zeroized on drop and never `Clone`
//! - Signature verification never panics and never errors: a bad key,
//!   bad signature, or mismatched message all verify as `false`
//! - All wire encodings are URL-safe base64

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod error;
pub mod exchange;
pub mod sealed;
pub mod signing;

pub use error::{CryptoError, Result};
pub use exchange::{EncryptionPrivateKey, EncryptionPublicKey, SharedSecret};
pub use sealed::{open, seal, SealedPayload};
pub use signing::{Signature, SigningPrivateKey, SigningPublicKey};
