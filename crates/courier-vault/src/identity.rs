//! Public identity and vault id derivation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use courier_crypto::SigningPublicKey;
use courier_protocol::limits::VAULT_ID_PREFIX;
use serde::{Deserialize, Serialize};

/// Domain context for vault id derivation.
const VAULT_ID_CONTEXT: &str = "courier vault id v1";

/// Derive the vault id from the signing public key.
///
/// The id is a pure function of the key, so it can never drift from the
/// identity it names: rotate the key and you have a new identity.
pub fn derive_vault_id(signing_public_key: &SigningPublicKey) -> String {
    let digest = blake3::derive_key(VAULT_ID_CONTEXT, signing_public_key.as_bytes());
    format!("{}{}", VAULT_ID_PREFIX, hex::encode(&digest[..16]))
}

/// The public half of a vault, as stored in `identity.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    /// Vault id derived from the signing key.
    pub vault_id: String,
    /// Human-friendly alias, when one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Ed25519 public key, URL-safe base64.
    pub signing_public_key: String,
    /// X25519 public key, URL-safe base64.
    pub encryption_public_key: String,
    /// When the vault was created.
    pub created_at: DateTime<Utc>,
    /// Per-relay registration state, keyed by server URL.
    #[serde(default)]
    pub registrations: BTreeMap<String, Registration>,
}

/// Registration state with one relay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registration {
    /// When registration with this relay completed.
    pub registered_at: DateTime<Utc>,
}
