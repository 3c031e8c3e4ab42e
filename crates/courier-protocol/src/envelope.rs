//! Message envelopes and the builder that produces them.
//!
//! A message is an `envelope` (routing metadata) plus a `payload`
//! (intent and body). The body is schema-less JSON by design: intents
//! name a conversation contract between agents, the protocol does not
//! interpret them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical;
use crate::limits::{DEFAULT_TTL_SECS, MAX_MESSAGE_SIZE, MESSAGE_ID_PREFIX, PROTOCOL_VERSION};
use crate::{ProtocolError, Result};

/// Discriminator for how a message participates in a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Expects a correlated reply.
    Request,
    /// One-way, no reply expected.
    Notification,
    /// Reply to an earlier request, correlated by id.
    Response,
    /// Error reply to an earlier request.
    Error,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::Request => "request",
            MessageType::Notification => "notification",
            MessageType::Response => "response",
            MessageType::Error => "error",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "request" => Ok(MessageType::Request),
            "notification" => Ok(MessageType::Notification),
            "response" => Ok(MessageType::Response),
            "error" => Ok(MessageType::Error),
            other => Err(ProtocolError::InvalidEnvelope {
                field: "type".into(),
                reason: format!("unknown message type '{other}'"),
            }),
        }
    }
}

/// Payload body media type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// Structured JSON body.
    #[default]
    #[serde(rename = "application/json")]
    Json,
    /// Plain text body.
    #[serde(rename = "text/plain")]
    Text,
}

/// Routing metadata for one message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message id (`msg_` prefix).
    pub id: String,
    /// Conversation role of the message.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Id of the request this message answers, when any.
    ///
    /// Omitted from serialization entirely when absent, so the
    /// canonical form has exactly one encoding for "no correlation".
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<String>,
    /// Sender vault id.
    pub sender: String,
    /// Recipient vault id.
    pub recipient: String,
    /// Intent discriminator, mirrored from the payload.
    pub intent: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Seconds after `timestamp` at which consumers may discard.
    pub ttl: u64,
    /// Protocol version.
    pub version: String,
}

/// Intent plus schema-less body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payload {
    /// Names the conversation contract; opaque to the protocol.
    pub intent: String,
    /// Media type of `body`.
    pub content_type: ContentType,
    /// Arbitrary JSON body.
    pub body: Value,
}

impl Payload {
    /// The body that replaces plaintext when a payload travels sealed.
    pub fn encrypted_placeholder() -> Value {
        serde_json::json!({ "_encrypted": true })
    }

    /// Whether this payload's body is the sealed placeholder.
    pub fn is_encrypted(&self) -> bool {
        self.body.get("_encrypted").and_then(Value::as_bool) == Some(true)
    }
}

/// A complete signed-about message (the signature travels outside).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Routing metadata.
    pub envelope: Envelope,
    /// Intent and body.
    pub payload: Payload,
}

impl Message {
    /// The canonical bytes a signature over this message covers.
    pub fn signable_content(&self) -> Result<Vec<u8>> {
        canonical::signable_content(self)
    }

    /// Whether the message is past `timestamp + ttl` at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        // A TTL too large to represent as a deadline never expires.
        let Ok(ttl) = i64::try_from(self.envelope.ttl) else {
            return false;
        };
        let Some(delta) = Duration::try_seconds(ttl) else {
            return false;
        };
        match self.envelope.timestamp.checked_add_signed(delta) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// Validate structural invariants.
    ///
    /// Rejects empty routing fields, an intent disagreement between
    /// envelope and payload, a zero TTL, and oversized canonical form.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("id", &self.envelope.id),
            ("sender", &self.envelope.sender),
            ("recipient", &self.envelope.recipient),
            ("intent", &self.envelope.intent),
        ] {
            if value.is_empty() {
                return Err(ProtocolError::InvalidEnvelope {
                    field: field.into(),
                    reason: "must not be empty".into(),
                });
            }
        }
        if let Some(correlation_id) = &self.envelope.correlation_id {
            if correlation_id.is_empty() {
                return Err(ProtocolError::InvalidEnvelope {
                    field: "correlation_id".into(),
                    reason: "must not be empty when present".into(),
                });
            }
        }
        if self.envelope.intent != self.payload.intent {
            return Err(ProtocolError::InvalidEnvelope {
                field: "intent".into(),
                reason: format!(
                    "envelope intent '{}' disagrees with payload intent '{}'",
                    self.envelope.intent, self.payload.intent
                ),
            });
        }
        if self.envelope.ttl == 0 {
            return Err(ProtocolError::InvalidEnvelope {
                field: "ttl".into(),
                reason: "must be positive".into(),
            });
        }
        let size = self.signable_content()?.len();
        if size > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size,
                limit: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }
}

/// Generate a fresh message id.
pub fn generate_message_id() -> String {
    format!("{}{}", MESSAGE_ID_PREFIX, Uuid::new_v4().simple())
}

/// Builder for [`Message`].
///
/// Fills in id, timestamp, version and TTL defaults; [`build`]
/// validates the result so an invalid message is never observable.
///
/// [`build`]: MessageBuilder::build
#[derive(Debug, Default)]
pub struct MessageBuilder {
    sender: String,
    recipient: String,
    intent: String,
    body: Value,
    message_type: Option<MessageType>,
    content_type: Option<ContentType>,
    correlation_id: Option<String>,
    ttl: Option<u64>,
}

impl MessageBuilder {
    /// Start a message from `sender` to `recipient` carrying `intent`.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        intent: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            intent: intent.into(),
            body: Value::Object(serde_json::Map::new()),
            ..Self::default()
        }
    }

    /// Set the JSON body (defaults to `{}`).
    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Set the message type (defaults to `request`).
    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Set the content type (defaults to `application/json`).
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Correlate this message with an earlier request.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Override the default TTL.
    pub fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Assemble and validate the message.
    pub fn build(self) -> Result<Message> {
        let intent = self.intent.clone();
        let message = Message {
            envelope: Envelope {
                id: generate_message_id(),
                message_type: self.message_type.unwrap_or(MessageType::Request),
                correlation_id: self.correlation_id,
                sender: self.sender,
                recipient: self.recipient,
                intent,
                timestamp: Utc::now(),
                ttl: self.ttl.unwrap_or(DEFAULT_TTL_SECS),
                version: PROTOCOL_VERSION.to_string(),
            },
            payload: Payload {
                intent: self.intent,
                content_type: self.content_type.unwrap_or_default(),
                body: self.body,
            },
        };
        message.validate()?;
        Ok(message)
    }
}
