//! The send workflow.
//!
//! resolve -> build -> sign -> seal -> transmit -> persist.
//!
//! The signature always covers the plaintext message. Sealing happens
//! after signing and replaces the payload body with the `_encrypted`
//! placeholder, so a relay can verify authenticity without ever seeing
//! content, and the recipient verifies the very bytes the sender meant.

use courier_crypto::{EncryptionPublicKey, SealedPayload, Signature};
use courier_protocol::limits::VAULT_ID_PREFIX;
use courier_protocol::{ContentType, Message, MessageBuilder, MessageType, Payload};
use courier_relay::{RelayClient, RelayError};
use courier_vault::{Direction, Vault};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{CoreError, Result};

/// Page size used when the registry must be scanned for a raw vault id.
const REGISTRY_PAGE: usize = 500;

/// Everything that parameterizes one send.
#[derive(Clone, Debug)]
pub struct SendOptions {
    /// Alias or vault id of the recipient.
    pub recipient: String,
    /// Intent discriminator.
    pub intent: String,
    /// JSON body.
    pub body: Value,
    /// Conversation role; defaults to `request`.
    pub message_type: MessageType,
    /// Body media type; defaults to `application/json`.
    pub content_type: ContentType,
    /// Correlates a reply with an earlier request.
    pub correlation_id: Option<String>,
    /// TTL override in seconds.
    pub ttl: Option<u64>,
    /// Seal the payload for the recipient.
    pub encrypt: bool,
}

impl SendOptions {
    /// Options for a plaintext request with an empty body.
    pub fn new(recipient: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            intent: intent.into(),
            body: Value::Object(serde_json::Map::new()),
            message_type: MessageType::Request,
            content_type: ContentType::Json,
            correlation_id: None,
            ttl: None,
            encrypt: false,
        }
    }
}

/// Outcome of a completed send.
#[derive(Clone, Debug)]
pub struct SentMessage {
    /// Id of the transmitted message.
    pub message_id: String,
    /// Resolved recipient vault id.
    pub recipient: String,
    /// Relay-assigned conversation id, when any.
    pub conversation_id: Option<String>,
    /// Whether the payload travelled sealed.
    pub encrypted: bool,
}

pub(crate) struct PreparedMessage {
    pub message: Message,
    pub signature: Signature,
    pub sealed: Option<SealedPayload>,
}

/// Build, sign and optionally seal a message. Pure with respect to the
/// network; resolution has already happened.
pub(crate) fn prepare_message(
    vault: &Vault,
    options: &SendOptions,
    recipient_vault_id: &str,
    recipient_key: Option<&EncryptionPublicKey>,
) -> Result<PreparedMessage> {
    let mut builder = MessageBuilder::new(vault.vault_id(), recipient_vault_id, &options.intent)
        .body(options.body.clone())
        .message_type(options.message_type)
        .content_type(options.content_type);
    if let Some(correlation_id) = &options.correlation_id {
        builder = builder.correlation_id(correlation_id);
    }
    if let Some(ttl) = options.ttl {
        builder = builder.ttl(ttl);
    }
    let mut message = builder.build()?;

    // Sign the plaintext form; the placeholder substitution below must
    // not be visible to the signature.
    let signature = vault.sign(&message.signable_content()?);

    let sealed = if options.encrypt {
        let key = recipient_key.ok_or_else(|| CoreError::MissingEncryptionKey {
            recipient: recipient_vault_id.to_string(),
        })?;
        let plaintext =
            serde_json::to_vec(&message.payload.body).map_err(courier_protocol::ProtocolError::from)?;
        let sealed = courier_crypto::seal(key, &plaintext)?;
        message.payload.body = Payload::encrypted_placeholder();
        Some(sealed)
    } else {
        None
    };

    Ok(PreparedMessage {
        message,
        signature,
        sealed,
    })
}

fn parse_entry_key(
    encryption_public_key: Option<&str>,
) -> Result<Option<EncryptionPublicKey>> {
    match encryption_public_key {
        Some(encoded) => Ok(Some(EncryptionPublicKey::from_base64(encoded)?)),
        None => Ok(None),
    }
}

/// Resolve `recipient` to a vault id, fetching its encryption key when
/// the payload will be sealed.
async fn resolve_recipient(
    client: &RelayClient,
    recipient: &str,
    need_key: bool,
) -> Result<(String, Option<EncryptionPublicKey>)> {
    if recipient.starts_with(VAULT_ID_PREFIX) {
        if !need_key {
            return Ok((recipient.to_string(), None));
        }
        // A raw vault id skips resolution, but sealing still needs the
        // registry entry for the recipient's encryption key.
        let entry = client
            .list_agents(REGISTRY_PAGE)
            .await?
            .into_iter()
            .find(|agent| agent.vault_id == recipient)
            .ok_or_else(|| RelayError::NotFound {
                what: recipient.to_string(),
            })?;
        let key = parse_entry_key(entry.encryption_public_key.as_deref())?;
        return Ok((recipient.to_string(), key));
    }

    let entry = client.resolve_alias(recipient).await?;
    let key = if need_key {
        parse_entry_key(entry.encryption_public_key.as_deref())?
    } else {
        None
    };
    debug!(alias = recipient, vault_id = %entry.vault_id, "resolved recipient");
    Ok((entry.vault_id, key))
}

/// Run the full send workflow.
///
/// Persisting the sent copy happens after transmission and is best
/// effort: a history write failure is logged, never unsent.
pub async fn send_message(
    vault: &Vault,
    client: &RelayClient,
    options: SendOptions,
) -> Result<SentMessage> {
    let (recipient_id, recipient_key) =
        resolve_recipient(client, &options.recipient, options.encrypt).await?;
    let prepared = prepare_message(vault, &options, &recipient_id, recipient_key.as_ref())?;

    let receipt = client
        .send_message(
            vault,
            &prepared.message,
            &prepared.signature,
            prepared.sealed.as_ref(),
        )
        .await?;

    let wire = json!({
        "message": prepared.message,
        "signature": prepared.signature.to_base64(),
        "encrypted_payload": prepared.sealed,
    });
    if let Err(error) = vault.save_message(Direction::Sent, &prepared.message.envelope.id, &wire) {
        warn!(message_id = %prepared.message.envelope.id, %error, "failed to persist sent message");
    }

    Ok(SentMessage {
        message_id: prepared.message.envelope.id,
        recipient: receipt.recipient,
        conversation_id: receipt.conversation_id,
        encrypted: prepared.sealed.is_some(),
    })
}
