//! Contact book and trust policy.
//!
//! Trust is explicit: a sender is known only if its vault id appears in
//! the book. The quarantine policy fails closed: with no stored policy,
//! messages from unknown senders are quarantined.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One known peer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    /// The peer's vault id.
    pub vault_id: String,
    /// Alias the peer was known by when added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Peer signing key, URL-safe base64, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_public_key: Option<String>,
    /// Peer encryption key, URL-safe base64, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_public_key: Option<String>,
    /// When the contact was added.
    pub added_at: DateTime<Utc>,
    /// Free-form operator notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The contact book plus the quarantine policy, stored as
/// `contacts.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactBook {
    /// Known peers keyed by vault id.
    #[serde(default)]
    pub contacts: BTreeMap<String, Contact>,
    /// Quarantine messages from senders not in the book.
    ///
    /// Defaults to `true` even when the stored file predates the field.
    #[serde(default = "quarantine_unknown_default")]
    pub quarantine_unknown: bool,
}

fn quarantine_unknown_default() -> bool {
    true
}

impl Default for ContactBook {
    fn default() -> Self {
        Self {
            contacts: BTreeMap::new(),
            quarantine_unknown: true,
        }
    }
}

impl ContactBook {
    /// Whether `vault_id` is a known contact.
    pub fn is_known(&self, vault_id: &str) -> bool {
        self.contacts.contains_key(vault_id)
    }

    /// Whether a message from `sender` should be quarantined.
    pub fn should_quarantine(&self, sender: &str) -> bool {
        self.quarantine_unknown && !self.is_known(sender)
    }

    /// Add or replace a contact.
    pub fn add(&mut self, contact: Contact) {
        self.contacts.insert(contact.vault_id.clone(), contact);
    }

    /// Remove a contact, returning it when it existed.
    pub fn remove(&mut self, vault_id: &str) -> Option<Contact> {
        self.contacts.remove(vault_id)
    }

    /// Look up a contact.
    pub fn get(&self, vault_id: &str) -> Option<&Contact> {
        self.contacts.get(vault_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(vault_id: &str) -> Contact {
        Contact {
            vault_id: vault_id.into(),
            alias: None,
            signing_public_key: None,
            encryption_public_key: None,
            added_at: Utc::now(),
            notes: None,
        }
    }

    #[test]
    fn test_default_policy_quarantines_unknown() {
        let book = ContactBook::default();
        assert!(book.quarantine_unknown);
        assert!(book.should_quarantine("vault_stranger"));
    }

    #[test]
    fn test_known_contact_not_quarantined() {
        let mut book = ContactBook::default();
        book.add(contact("vault_friend"));
        assert!(!book.should_quarantine("vault_friend"));
        assert!(book.should_quarantine("vault_stranger"));
    }

    #[test]
    fn test_policy_disabled_lets_everything_through() {
        let mut book = ContactBook::default();
        book.quarantine_unknown = false;
        assert!(!book.should_quarantine("vault_stranger"));
    }

    #[test]
    fn test_missing_policy_field_fails_closed() {
        // Contact files written before the policy field existed.
        let book: ContactBook = serde_json::from_str(r#"{"contacts":{}}"#).unwrap();
        assert!(book.quarantine_unknown);
    }

    #[test]
    fn test_add_remove() {
        let mut book = ContactBook::default();
        book.add(contact("vault_peer"));
        assert!(book.is_known("vault_peer"));

        let removed = book.remove("vault_peer").unwrap();
        assert_eq!(removed.vault_id, "vault_peer");
        assert!(!book.is_known("vault_peer"));
        assert!(book.remove("vault_peer").is_none());
    }
}
