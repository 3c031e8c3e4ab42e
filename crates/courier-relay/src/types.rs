//! Wire types exchanged with a relay.

use chrono::{DateTime, Utc};
use courier_crypto::SealedPayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the relay's agent registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentEntry {
    /// The agent's vault id.
    pub vault_id: String,
    /// Registered alias, when any.
    #[serde(default)]
    pub alias: Option<String>,
    /// Ed25519 public key, URL-safe base64.
    #[serde(default)]
    pub signing_public_key: Option<String>,
    /// X25519 public key, URL-safe base64. Absent for agents that
    /// cannot receive sealed payloads.
    #[serde(default)]
    pub encryption_public_key: Option<String>,
    /// When the agent registered.
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

/// Registration challenge issued by the relay.
#[derive(Clone, Debug, Deserialize)]
pub struct Challenge {
    /// Opaque challenge string to sign.
    pub challenge: String,
}

/// Relay acknowledgement of an accepted message.
#[derive(Clone, Debug, Deserialize)]
pub struct SendReceipt {
    /// Id of the stored message.
    pub message_id: String,
    /// Resolved recipient vault id.
    pub recipient: String,
    /// Relay-assigned conversation id, when the relay threads them.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// One undelivered message as the relay hands it out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboxItem {
    /// Id of the message.
    pub message_id: String,
    /// The wire message (`envelope` + `payload`), kept as raw JSON so
    /// verification covers exactly what the sender signed.
    pub message: Value,
    /// Sender's signature over the canonical message form.
    pub signature: String,
    /// Sender vault id as recorded by the relay.
    #[serde(default)]
    pub sender: Option<String>,
    /// Sealed payload travelling alongside an encrypted message.
    #[serde(default)]
    pub encrypted_payload: Option<SealedPayload>,
    /// When the relay accepted the message.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

/// Relay health report.
#[derive(Clone, Debug, Deserialize)]
pub struct HealthStatus {
    /// Relay-reported status string, `ok` when healthy.
    pub status: String,
    /// Number of registered agents, when reported.
    #[serde(default)]
    pub agents: Option<u64>,
}

#[derive(Deserialize)]
pub(crate) struct ReceiveResponse {
    #[serde(default)]
    pub messages: Vec<InboxItem>,
}

#[derive(Deserialize)]
pub(crate) struct AgentsResponse {
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

#[derive(Deserialize)]
pub(crate) struct ApiFailure {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_item_minimal_fields() {
        let item: InboxItem = serde_json::from_str(
            r#"{
                "message_id": "msg_1",
                "message": {"envelope": {"id": "msg_1"}, "payload": {}},
                "signature": "c2ln"
            }"#,
        )
        .unwrap();
        assert_eq!(item.message_id, "msg_1");
        assert!(item.sender.is_none());
        assert!(item.encrypted_payload.is_none());
    }

    #[test]
    fn test_inbox_item_with_sealed_payload() {
        let item: InboxItem = serde_json::from_str(
            r#"{
                "message_id": "msg_2",
                "message": {},
                "signature": "c2ln",
                "sender": "vault_abc",
                "encrypted_payload": {
                    "ephemeral_public_key": "a2V5",
                    "nonce": "bm9uY2U=",
                    "ciphertext": "Y3Q="
                }
            }"#,
        )
        .unwrap();
        assert!(item.encrypted_payload.is_some());
        assert_eq!(item.sender.as_deref(), Some("vault_abc"));
    }

    #[test]
    fn test_agent_entry_without_encryption_key() {
        let entry: AgentEntry = serde_json::from_str(
            r#"{"vault_id": "vault_x", "alias": "agent-x"}"#,
        )
        .unwrap();
        assert!(entry.encryption_public_key.is_none());
    }

    #[test]
    fn test_empty_inbox() {
        let response: ReceiveResponse = serde_json::from_str(r#"{"messages": []}"#).unwrap();
        assert!(response.messages.is_empty());
    }
}
