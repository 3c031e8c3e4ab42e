//! The receive workflow.
//!
//! For every fetched message: dedup -> decrypt -> verify -> classify ->
//! persist. Decryption precedes verification because signatures cover
//! the plaintext message; a sealed payload must be opened before its
//! signature can mean anything.
//!
//! A bad message is never dropped and never aborts the batch: failures
//! become per-message annotations and the message still lands in
//! history or quarantine for later inspection.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_crypto::{Signature, SigningPublicKey};
use courier_protocol::canonical::signable_content_of_value;
use courier_protocol::Message;
use courier_relay::{AgentEntry, InboxItem, RelayClient};
use courier_vault::{Direction, Vault};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::shutdown::Shutdown;
use crate::Result;

/// Quarantine reason recorded for messages from unknown senders.
const REASON_UNKNOWN_SENDER: &str = "unknown_sender";

/// Page size for filling the sender directory.
const DIRECTORY_PAGE: usize = 500;

/// Everything that parameterizes one receive pass.
#[derive(Clone, Debug)]
pub struct ReceiveOptions {
    /// Maximum messages fetched per pass.
    pub limit: usize,
    /// Open sealed payloads.
    pub decrypt: bool,
    /// Verify signatures (on by default).
    pub verify: bool,
    /// Acknowledge each processed message back to the relay.
    pub acknowledge: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            decrypt: false,
            verify: true,
            acknowledge: false,
        }
    }
}

/// Outcome of processing one inbound message.
///
/// Flags are annotations, not verdicts: a message with
/// `verified: Some(false)` was still stored, just marked.
#[derive(Clone, Debug, Serialize)]
pub struct MessageReport {
    /// Message id.
    pub message_id: String,
    /// Sender vault id, when determinable.
    pub sender: Option<String>,
    /// Sender's registry alias, when known.
    pub sender_alias: Option<String>,
    /// Payload intent, when the message parses.
    pub intent: Option<String>,
    /// The message, with its body restored to plaintext when decrypted.
    pub message: Value,
    /// `Some(true)` verified, `Some(false)` failed, `None` not checked
    /// (verification disabled, or the payload is still sealed).
    pub verified: Option<bool>,
    /// Why verification did not succeed.
    pub verification_error: Option<String>,
    /// Whether a sealed payload was opened.
    pub decrypted: bool,
    /// Why decryption failed.
    pub decryption_error: Option<String>,
    /// Sender is in the contact book.
    pub known_contact: bool,
    /// Message was stored in quarantine rather than history.
    pub quarantined: bool,
    /// Message is past its TTL.
    pub expired: bool,
    /// When the relay accepted the message.
    pub received_at: Option<DateTime<Utc>>,
}

/// Session cache over the relay's agent registry.
///
/// Fills once per run with a single `GET /agents`; a miss triggers at
/// most one refresh, so a sender that registered mid-run is still
/// found without hammering the registry.
#[derive(Debug, Default)]
pub struct SenderDirectory {
    entries: HashMap<String, AgentEntry>,
    filled: bool,
    refreshed: bool,
}

impl SenderDirectory {
    /// Empty directory; fills lazily on first lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a sender's registry entry.
    pub async fn lookup(&mut self, client: &RelayClient, vault_id: &str) -> Option<AgentEntry> {
        if !self.filled {
            self.fill(client).await;
        }
        if !self.entries.contains_key(vault_id) && self.filled && !self.refreshed {
            self.refreshed = true;
            self.fill(client).await;
        }
        self.entries.get(vault_id).cloned()
    }

    async fn fill(&mut self, client: &RelayClient) {
        match client.list_agents(DIRECTORY_PAGE).await {
            Ok(agents) => {
                self.entries = agents
                    .into_iter()
                    .map(|agent| (agent.vault_id.clone(), agent))
                    .collect();
                self.filled = true;
            }
            // Verification will be annotated as unverifiable; the
            // batch itself continues.
            Err(error) => warn!(%error, "could not load agent directory"),
        }
    }

    #[cfg(test)]
    fn preloaded(agents: Vec<AgentEntry>) -> Self {
        Self {
            entries: agents
                .into_iter()
                .map(|agent| (agent.vault_id.clone(), agent))
                .collect(),
            filled: true,
            refreshed: true,
        }
    }
}

/// State carried across the iterations of one receive run.
///
/// The seen-set lives and dies with the run: cross-run dedup is the
/// idempotent history store's job.
#[derive(Debug, Default)]
pub struct ReceiveRun {
    seen: HashSet<String>,
    /// Shared registry cache for the run.
    pub directory: SenderDirectory,
}

impl ReceiveRun {
    /// Fresh state for one run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message_id` as seen; `true` the first time.
    pub fn mark_seen(&mut self, message_id: &str) -> bool {
        self.seen.insert(message_id.to_string())
    }
}

fn sender_of(item: &InboxItem) -> Option<String> {
    item.sender.clone().or_else(|| {
        item.message
            .pointer("/envelope/sender")
            .and_then(Value::as_str)
            .map(String::from)
    })
}

fn verify_message(
    message: &Value,
    signature: &str,
    entry: Option<&AgentEntry>,
) -> std::result::Result<(), String> {
    let entry = entry.ok_or("sender not found in relay registry")?;
    let encoded_key = entry
        .signing_public_key
        .as_deref()
        .ok_or("sender has no signing key on record")?;
    let key = SigningPublicKey::from_base64(encoded_key)
        .map_err(|e| format!("sender signing key invalid: {e}"))?;
    let signature =
        Signature::from_base64(signature).map_err(|e| format!("signature invalid: {e}"))?;
    let signable = signable_content_of_value(message).map_err(|e| e.to_string())?;
    if key.verify(&signable, &signature) {
        Ok(())
    } else {
        Err("signature does not match message".into())
    }
}

/// Process one fetched message: decrypt, verify, classify, persist.
///
/// Never fails; every problem becomes an annotation on the report.
pub(crate) fn process_item(
    vault: &Vault,
    options: &ReceiveOptions,
    item: &InboxItem,
    entry: Option<&AgentEntry>,
) -> MessageReport {
    let sender = sender_of(item);

    // Decrypt first: the signature covers the plaintext message, so a
    // sealed payload must be opened before verification can mean
    // anything.
    let mut message = item.message.clone();
    let mut decrypted = false;
    let mut decryption_error = None;
    if let Some(sealed) = &item.encrypted_payload {
        if options.decrypt {
            match vault.open_sealed(sealed) {
                Ok(plaintext) => {
                    let body = serde_json::from_slice::<Value>(&plaintext).unwrap_or_else(|_| {
                        Value::String(String::from_utf8_lossy(&plaintext).into_owned())
                    });
                    match message.pointer_mut("/payload") {
                        Some(payload) => {
                            payload["body"] = body;
                            decrypted = true;
                        }
                        None => {
                            decryption_error =
                                Some("message carries no payload object".to_string());
                        }
                    }
                }
                Err(error) => decryption_error = Some(error.to_string()),
            }
        }
    }

    let mut verified = None;
    let mut verification_error = None;
    if options.verify {
        if item.encrypted_payload.is_some() && !decrypted {
            // Cannot check a plaintext signature against a sealed body.
            verification_error =
                Some("payload still sealed; decrypt to verify the signature".to_string());
        } else {
            match verify_message(&message, &item.signature, entry) {
                Ok(()) => verified = Some(true),
                Err(reason) => {
                    verified = Some(false);
                    verification_error = Some(reason);
                }
            }
        }
    }

    let (intent, expired) = match serde_json::from_value::<Message>(message.clone()) {
        Ok(typed) => (
            Some(typed.envelope.intent.clone()),
            typed.is_expired_at(Utc::now()),
        ),
        Err(_) => (
            message
                .pointer("/payload/intent")
                .and_then(Value::as_str)
                .map(String::from),
            false,
        ),
    };

    // Trust classification is independent of verification: a perfectly
    // signed message from a stranger is still a stranger's message.
    let (known_contact, quarantined) = match &sender {
        Some(sender) => (
            vault.contacts().is_known(sender),
            vault.contacts().should_quarantine(sender),
        ),
        // No determinable sender fails closed.
        None => (false, vault.contacts().quarantine_unknown),
    };

    let stored = json!({
        "message": message,
        "signature": item.signature,
        "sender": sender,
        "received_at": item.received_at,
    });
    let persisted = if quarantined {
        vault.save_to_quarantine(&item.message_id, REASON_UNKNOWN_SENDER, &stored)
    } else {
        vault.save_message(Direction::Received, &item.message_id, &stored)
    };
    if let Err(error) = persisted {
        warn!(message_id = %item.message_id, %error, "failed to persist received message");
    }

    MessageReport {
        message_id: item.message_id.clone(),
        sender,
        sender_alias: entry.and_then(|e| e.alias.clone()),
        intent,
        message,
        verified,
        verification_error,
        decrypted,
        decryption_error,
        known_contact,
        quarantined,
        expired,
        received_at: item.received_at,
    }
}

/// Fetch one batch and process every message in it.
pub async fn fetch_and_process(
    vault: &Vault,
    client: &RelayClient,
    options: &ReceiveOptions,
    run: &mut ReceiveRun,
) -> Result<Vec<MessageReport>> {
    let items = client.receive(vault, options.limit).await?;
    debug!(count = items.len(), "fetched inbox batch");

    let mut reports = Vec::new();
    for item in items {
        if !run.mark_seen(&item.message_id) {
            continue;
        }
        let entry = match sender_of(&item) {
            Some(sender) => run.directory.lookup(client, &sender).await,
            None => None,
        };
        let report = process_item(vault, options, &item, entry.as_ref());
        if options.acknowledge {
            if let Err(error) = client.acknowledge(vault, &item.message_id).await {
                warn!(message_id = %item.message_id, %error, "acknowledge failed");
            }
        }
        reports.push(report);
    }
    Ok(reports)
}

/// One-shot receive: fetch a single batch with fresh run state.
pub async fn receive_once(
    vault: &Vault,
    client: &RelayClient,
    options: &ReceiveOptions,
) -> Result<Vec<MessageReport>> {
    let mut run = ReceiveRun::new();
    fetch_and_process(vault, client, options, &mut run).await
}

/// Poll the relay until `shutdown` triggers.
///
/// Each batch is delivered to `on_batch` as it completes. A retryable
/// failure (relay unreachable, or a server-side error) is logged and
/// retried next interval; any other error ends the loop. Cancellation
/// is checked between iterations, never mid-batch.
pub async fn poll<F>(
    vault: &Vault,
    client: &RelayClient,
    options: &ReceiveOptions,
    interval: Duration,
    mut shutdown: Shutdown,
    mut on_batch: F,
) -> Result<()>
where
    F: FnMut(Vec<MessageReport>),
{
    let mut run = ReceiveRun::new();
    while !shutdown.is_triggered() {
        match fetch_and_process(vault, client, options, &mut run).await {
            Ok(reports) => {
                if !reports.is_empty() {
                    on_batch(reports);
                }
            }
            Err(error) if error.is_retryable() => {
                warn!(%error, "transient relay failure; retrying next interval");
            }
            Err(error) => return Err(error),
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.triggered() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send::{prepare_message, SendOptions};
    use courier_vault::Contact;
    use serde_json::json;

    fn temp_vault() -> (tempfile::TempDir, Vault) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::create(dir.path().join("vault")).unwrap();
        (dir, vault)
    }

    fn entry_for(vault: &Vault, alias: Option<&str>) -> AgentEntry {
        AgentEntry {
            vault_id: vault.vault_id().to_string(),
            alias: alias.map(String::from),
            signing_public_key: Some(vault.signing_public_key().to_base64()),
            encryption_public_key: Some(vault.encryption_public_key().to_base64()),
            registered_at: None,
        }
    }

    fn item_from(sender: &Vault, recipient: &Vault, encrypt: bool, body: Value) -> InboxItem {
        let options = SendOptions {
            body,
            encrypt,
            ..SendOptions::new(recipient.vault_id(), "test.intent")
        };
        let key = encrypt.then(|| recipient.encryption_public_key());
        let prepared =
            prepare_message(sender, &options, recipient.vault_id(), key.as_ref()).unwrap();
        InboxItem {
            message_id: prepared.message.envelope.id.clone(),
            message: serde_json::to_value(&prepared.message).unwrap(),
            signature: prepared.signature.to_base64(),
            sender: Some(sender.vault_id().to_string()),
            encrypted_payload: prepared.sealed,
            received_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_plaintext_message_verifies_and_quarantines_stranger() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let item = item_from(&sender, &recipient, false, json!({"n": 1}));
        let entry = entry_for(&sender, Some("agent-sender"));

        let report = process_item(&recipient, &ReceiveOptions::default(), &item, Some(&entry));

        assert_eq!(report.verified, Some(true));
        assert!(report.verification_error.is_none());
        assert_eq!(report.sender_alias.as_deref(), Some("agent-sender"));
        assert_eq!(report.intent.as_deref(), Some("test.intent"));
        // Unknown sender, fail-closed policy.
        assert!(!report.known_contact);
        assert!(report.quarantined);
        assert_eq!(recipient.quarantine(10).unwrap().len(), 1);
        assert!(recipient.history(10).unwrap().is_empty());
    }

    #[test]
    fn test_known_contact_lands_in_history() {
        let (_sd, sender) = temp_vault();
        let (_rd, mut recipient) = temp_vault();
        recipient
            .add_contact(Contact {
                vault_id: sender.vault_id().to_string(),
                alias: None,
                signing_public_key: None,
                encryption_public_key: None,
                added_at: Utc::now(),
                notes: None,
            })
            .unwrap();

        let item = item_from(&sender, &recipient, false, json!({}));
        let entry = entry_for(&sender, None);
        let report = process_item(&recipient, &ReceiveOptions::default(), &item, Some(&entry));

        assert!(report.known_contact);
        assert!(!report.quarantined);
        assert_eq!(recipient.history(10).unwrap().len(), 1);
        assert!(recipient.quarantine(10).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_message_annotated_not_dropped() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let mut item = item_from(&sender, &recipient, false, json!({"amount": 10}));
        item.message["payload"]["body"]["amount"] = json!(10_000);
        let entry = entry_for(&sender, None);

        let report = process_item(&recipient, &ReceiveOptions::default(), &item, Some(&entry));

        assert_eq!(report.verified, Some(false));
        assert!(report
            .verification_error
            .as_deref()
            .unwrap()
            .contains("does not match"));
        // Still persisted for inspection.
        assert_eq!(recipient.quarantine(10).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_sender_key_is_unverifiable() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let item = item_from(&sender, &recipient, false, json!({}));

        let report = process_item(&recipient, &ReceiveOptions::default(), &item, None);

        assert_eq!(report.verified, Some(false));
        assert!(report
            .verification_error
            .as_deref()
            .unwrap()
            .contains("not found in relay registry"));
    }

    #[test]
    fn test_sealed_message_decrypts_then_verifies() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let item = item_from(&sender, &recipient, true, json!({"secret": "yes"}));
        let entry = entry_for(&sender, None);

        let options = ReceiveOptions {
            decrypt: true,
            ..ReceiveOptions::default()
        };
        let report = process_item(&recipient, &options, &item, Some(&entry));

        assert!(report.decrypted);
        assert!(report.decryption_error.is_none());
        assert_eq!(report.message["payload"]["body"], json!({"secret": "yes"}));
        // Signature covers the plaintext, so after restoring the body
        // verification succeeds.
        assert_eq!(report.verified, Some(true));
    }

    #[test]
    fn test_sealed_without_decrypt_is_unchecked() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let item = item_from(&sender, &recipient, true, json!({"secret": "yes"}));
        let entry = entry_for(&sender, None);

        let report = process_item(&recipient, &ReceiveOptions::default(), &item, Some(&entry));

        assert!(!report.decrypted);
        assert_eq!(report.verified, None);
        assert!(report
            .verification_error
            .as_deref()
            .unwrap()
            .contains("still sealed"));
        assert_eq!(report.message["payload"]["body"], json!({"_encrypted": true}));
    }

    #[test]
    fn test_sealed_for_someone_else_annotates_decryption_error() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let (_od, other) = temp_vault();
        // Sealed for `other`, delivered to `recipient`.
        let mut item = item_from(&sender, &other, true, json!({"secret": "yes"}));
        item.message["envelope"]["recipient"] = json!(recipient.vault_id());

        let options = ReceiveOptions {
            decrypt: true,
            ..ReceiveOptions::default()
        };
        let report = process_item(&recipient, &options, &item, None);

        assert!(!report.decrypted);
        assert!(report.decryption_error.is_some());
    }

    #[test]
    fn test_verification_disabled() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let item = item_from(&sender, &recipient, false, json!({}));

        let options = ReceiveOptions {
            verify: false,
            ..ReceiveOptions::default()
        };
        let report = process_item(&recipient, &options, &item, None);

        assert_eq!(report.verified, None);
        assert!(report.verification_error.is_none());
    }

    #[test]
    fn test_expired_message_flagged() {
        let (_sd, sender) = temp_vault();
        let (_rd, recipient) = temp_vault();
        let mut item = item_from(&sender, &recipient, false, json!({}));
        item.message["envelope"]["timestamp"] = json!("2020-01-01T00:00:00Z");
        let entry = entry_for(&sender, None);

        let report = process_item(&recipient, &ReceiveOptions::default(), &item, Some(&entry));

        assert!(report.expired);
        // Tampering with the timestamp also breaks the signature.
        assert_eq!(report.verified, Some(false));
    }

    #[test]
    fn test_malformed_message_still_reported() {
        let (_rd, recipient) = temp_vault();
        let item = InboxItem {
            message_id: "msg_garbage".into(),
            message: json!({"not": "a message"}),
            signature: "bm90LWEtc2ln".into(),
            sender: None,
            encrypted_payload: None,
            received_at: None,
        };

        let report = process_item(&recipient, &ReceiveOptions::default(), &item, None);

        assert_eq!(report.message_id, "msg_garbage");
        assert_eq!(report.verified, Some(false));
        assert!(report.quarantined);
        assert!(report.intent.is_none());
    }

    #[test]
    fn test_mark_seen_dedups_within_run_only() {
        let mut run = ReceiveRun::new();
        assert!(run.mark_seen("msg_1"));
        assert!(!run.mark_seen("msg_1"));
        assert!(run.mark_seen("msg_2"));

        // A fresh run starts clean.
        let mut next = ReceiveRun::new();
        assert!(next.mark_seen("msg_1"));
    }

    #[test]
    fn test_preloaded_directory_lookup() {
        let (_sd, sender) = temp_vault();
        let directory = SenderDirectory::preloaded(vec![entry_for(&sender, Some("agent-a"))]);
        assert!(directory.entries.contains_key(sender.vault_id()));
    }
}
