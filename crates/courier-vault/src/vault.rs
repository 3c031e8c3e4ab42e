//! The vault itself.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use courier_crypto::{
    EncryptionPrivateKey, EncryptionPublicKey, SealedPayload, Signature, SigningPrivateKey,
    SigningPublicKey,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::contacts::{Contact, ContactBook};
use crate::fs::{write_atomic, write_private};
use crate::history::{
    history_path, list_records, quarantine_path, save_json, Direction, HistoryRecord,
    QuarantineRecord,
};
use crate::identity::{derive_vault_id, Identity, Registration};
use crate::{Result, VaultError};

const IDENTITY_FILE: &str = "identity.json";
const SIGNING_KEY_FILE: &str = "signing_key.bin";
const ENCRYPTION_KEY_FILE: &str = "encryption_key.bin";
const CONTACTS_FILE: &str = "contacts.json";
const HISTORY_DIR: &str = "history";
const QUARANTINE_DIR: &str = "quarantine";

/// An opened vault.
///
/// Holds the private keys in memory for the lifetime of the handle;
/// they are zeroized when it drops. All signing and opening of sealed
/// payloads happens through this type so key bytes never escape.
pub struct Vault {
    root: PathBuf,
    identity: Identity,
    contacts: ContactBook,
    signing_key: SigningPrivateKey,
    encryption_key: EncryptionPrivateKey,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("root", &self.root)
            .field("vault_id", &self.identity.vault_id)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Create a fresh vault at `root`, generating both key pairs.
    ///
    /// Fails with [`VaultError::AlreadyExists`] if an identity file is
    /// already present.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.join(IDENTITY_FILE).exists() {
            return Err(VaultError::AlreadyExists { path: root });
        }
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join(HISTORY_DIR))?;
        fs::create_dir_all(root.join(QUARANTINE_DIR))?;

        let signing_key = SigningPrivateKey::generate();
        let encryption_key = EncryptionPrivateKey::generate();

        write_private(&root.join(SIGNING_KEY_FILE), signing_key.as_bytes())?;
        write_private(&root.join(ENCRYPTION_KEY_FILE), encryption_key.as_bytes())?;

        let identity = Identity {
            vault_id: derive_vault_id(&signing_key.public_key()),
            alias: None,
            signing_public_key: signing_key.public_key().to_base64(),
            encryption_public_key: encryption_key.public_key().to_base64(),
            created_at: Utc::now(),
            registrations: Default::default(),
        };
        let contacts = ContactBook::default();

        let vault = Self {
            root,
            identity,
            contacts,
            signing_key,
            encryption_key,
        };
        vault.persist_identity()?;
        vault.persist_contacts()?;
        info!(vault_id = %vault.identity.vault_id, root = %vault.root.display(), "created vault");
        Ok(vault)
    }

    /// Open an existing vault at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let identity_path = root.join(IDENTITY_FILE);
        if !identity_path.exists() {
            return Err(VaultError::NotInitialized { path: root });
        }

        let identity: Identity = serde_json::from_slice(&fs::read(identity_path)?)?;
        let contacts: ContactBook = serde_json::from_slice(&fs::read(root.join(CONTACTS_FILE))?)?;
        let signing_key = SigningPrivateKey::from_bytes(&fs::read(root.join(SIGNING_KEY_FILE))?)?;
        let encryption_key =
            EncryptionPrivateKey::from_bytes(&fs::read(root.join(ENCRYPTION_KEY_FILE))?)?;

        let derived = derive_vault_id(&signing_key.public_key());
        if derived != identity.vault_id {
            return Err(VaultError::Corrupt {
                reason: format!(
                    "identity file names {} but the signing key derives {derived}",
                    identity.vault_id
                ),
            });
        }

        debug!(vault_id = %identity.vault_id, root = %root.display(), "opened vault");
        Ok(Self {
            root,
            identity,
            contacts,
            signing_key,
            encryption_key,
        })
    }

    /// Open the vault at `root`, creating it first when missing.
    ///
    /// Returns the vault and whether it was newly created.
    pub fn open_or_create(root: impl Into<PathBuf>) -> Result<(Self, bool)> {
        let root = root.into();
        if root.join(IDENTITY_FILE).exists() {
            Ok((Self::open(root)?, false))
        } else {
            Ok((Self::create(root)?, true))
        }
    }

    /// The vault directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The public identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The vault id.
    pub fn vault_id(&self) -> &str {
        &self.identity.vault_id
    }

    /// The configured alias, when any.
    pub fn alias(&self) -> Option<&str> {
        self.identity.alias.as_deref()
    }

    /// Set the alias and persist the identity.
    pub fn set_alias(&mut self, alias: impl Into<String>) -> Result<()> {
        self.identity.alias = Some(alias.into());
        self.persist_identity()
    }

    /// Record a completed registration with `server`.
    pub fn record_registration(&mut self, server: &str) -> Result<()> {
        self.identity.registrations.insert(
            server.to_string(),
            Registration {
                registered_at: Utc::now(),
            },
        );
        self.persist_identity()
    }

    /// Whether this vault has registered with `server`.
    pub fn is_registered_with(&self, server: &str) -> bool {
        self.identity.registrations.contains_key(server)
    }

    /// The Ed25519 public key.
    pub fn signing_public_key(&self) -> SigningPublicKey {
        self.signing_key.public_key()
    }

    /// The X25519 public key.
    pub fn encryption_public_key(&self) -> EncryptionPublicKey {
        self.encryption_key.public_key()
    }

    /// Sign `content` with the vault signing key.
    pub fn sign(&self, content: &[u8]) -> Signature {
        self.signing_key.sign(content)
    }

    /// Open a sealed payload addressed to this vault.
    pub fn open_sealed(&self, sealed: &SealedPayload) -> courier_crypto::Result<Vec<u8>> {
        courier_crypto::open(&self.encryption_key, sealed)
    }

    /// The contact book.
    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }

    /// Add or replace a contact and persist the book.
    pub fn add_contact(&mut self, contact: Contact) -> Result<()> {
        self.contacts.add(contact);
        self.persist_contacts()
    }

    /// Remove a contact and persist the book.
    pub fn remove_contact(&mut self, vault_id: &str) -> Result<Option<Contact>> {
        let removed = self.contacts.remove(vault_id);
        if removed.is_some() {
            self.persist_contacts()?;
        }
        Ok(removed)
    }

    /// Change the quarantine policy and persist the book.
    pub fn set_quarantine_unknown(&mut self, quarantine: bool) -> Result<()> {
        self.contacts.quarantine_unknown = quarantine;
        self.persist_contacts()
    }

    /// Store a message in history. Idempotent per (direction, id).
    pub fn save_message(
        &self,
        direction: Direction,
        message_id: &str,
        message: &Value,
    ) -> Result<()> {
        let record = HistoryRecord {
            message_id: message_id.to_string(),
            direction,
            stored_at: Utc::now(),
            message: message.clone(),
        };
        save_json(
            &history_path(&self.root.join(HISTORY_DIR), direction, message_id),
            &record,
        )
    }

    /// Store a message in quarantine with a reason.
    pub fn save_to_quarantine(
        &self,
        message_id: &str,
        reason: &str,
        message: &Value,
    ) -> Result<()> {
        let record = QuarantineRecord {
            message_id: message_id.to_string(),
            reason: reason.to_string(),
            quarantined_at: Utc::now(),
            message: message.clone(),
        };
        save_json(
            &quarantine_path(&self.root.join(QUARANTINE_DIR), message_id),
            &record,
        )
    }

    /// List history entries, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        list_records(&self.root.join(HISTORY_DIR), limit, |r: &HistoryRecord| {
            r.stored_at
        })
    }

    /// List quarantined entries, newest first.
    pub fn quarantine(&self, limit: usize) -> Result<Vec<QuarantineRecord>> {
        list_records(
            &self.root.join(QUARANTINE_DIR),
            limit,
            |r: &QuarantineRecord| r.quarantined_at,
        )
    }

    fn persist_identity(&self) -> Result<()> {
        write_atomic(
            &self.root.join(IDENTITY_FILE),
            &serde_json::to_vec_pretty(&self.identity)?,
        )
    }

    fn persist_contacts(&self) -> Result<()> {
        write_atomic(
            &self.root.join(CONTACTS_FILE),
            &serde_json::to_vec_pretty(&self.contacts)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_vault() -> (tempfile::TempDir, Vault) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::create(dir.path().join("vault")).unwrap();
        (dir, vault)
    }

    #[test]
    fn test_create_lays_out_directory() {
        let (_dir, vault) = temp_vault();
        for file in [IDENTITY_FILE, SIGNING_KEY_FILE, ENCRYPTION_KEY_FILE, CONTACTS_FILE] {
            assert!(vault.root().join(file).exists(), "{file} missing");
        }
        assert!(vault.root().join(HISTORY_DIR).is_dir());
        assert!(vault.root().join(QUARANTINE_DIR).is_dir());
    }

    #[test]
    fn test_create_twice_fails() {
        let (_dir, vault) = temp_vault();
        let result = Vault::create(vault.root());
        assert!(matches!(result, Err(VaultError::AlreadyExists { .. })));
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Vault::open(dir.path().join("absent"));
        assert!(matches!(result, Err(VaultError::NotInitialized { .. })));
    }

    #[test]
    fn test_reopen_preserves_identity() {
        let (_dir, vault) = temp_vault();
        let vault_id = vault.vault_id().to_string();
        let signing_public = vault.signing_public_key();
        let root = vault.root().to_path_buf();
        drop(vault);

        let reopened = Vault::open(&root).unwrap();
        assert_eq!(reopened.vault_id(), vault_id);
        assert_eq!(reopened.signing_public_key(), signing_public);
    }

    #[test]
    fn test_open_or_create_reports_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault");

        let (first, created) = Vault::open_or_create(&path).unwrap();
        assert!(created);
        let id = first.vault_id().to_string();
        drop(first);

        let (second, created) = Vault::open_or_create(&path).unwrap();
        assert!(!created);
        assert_eq!(second.vault_id(), id);
    }

    #[test]
    fn test_tampered_identity_detected() {
        let (_dir, vault) = temp_vault();
        let root = vault.root().to_path_buf();
        drop(vault);

        let path = root.join(IDENTITY_FILE);
        let mut identity: Identity =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        identity.vault_id = "vault_00000000000000000000000000000000".into();
        fs::write(&path, serde_json::to_vec(&identity).unwrap()).unwrap();

        assert!(matches!(Vault::open(&root), Err(VaultError::Corrupt { .. })));
    }

    #[test]
    fn test_vault_id_matches_derivation() {
        let (_dir, vault) = temp_vault();
        assert_eq!(
            vault.vault_id(),
            derive_vault_id(&vault.signing_public_key())
        );
    }

    #[test]
    fn test_sign_verifies_with_public_key() {
        let (_dir, vault) = temp_vault();
        let sig = vault.sign(b"canonical bytes");
        assert!(vault.signing_public_key().verify(b"canonical bytes", &sig));
    }

    #[test]
    fn test_seal_open_through_vault() {
        let (_dir, vault) = temp_vault();
        let sealed =
            courier_crypto::seal(&vault.encryption_public_key(), b"for your eyes").unwrap();
        assert_eq!(vault.open_sealed(&sealed).unwrap(), b"for your eyes");
    }

    #[test]
    fn test_alias_persists() {
        let (_dir, mut vault) = temp_vault();
        vault.set_alias("agent-research").unwrap();
        let root = vault.root().to_path_buf();
        drop(vault);

        let reopened = Vault::open(&root).unwrap();
        assert_eq!(reopened.alias(), Some("agent-research"));
    }

    #[test]
    fn test_registration_state_persists() {
        let (_dir, mut vault) = temp_vault();
        assert!(!vault.is_registered_with("http://relay.test"));
        vault.record_registration("http://relay.test").unwrap();
        let root = vault.root().to_path_buf();
        drop(vault);

        let reopened = Vault::open(&root).unwrap();
        assert!(reopened.is_registered_with("http://relay.test"));
    }

    #[test]
    fn test_contacts_persist() {
        let (_dir, mut vault) = temp_vault();
        vault
            .add_contact(Contact {
                vault_id: "vault_friend".into(),
                alias: Some("friend".into()),
                signing_public_key: None,
                encryption_public_key: None,
                added_at: Utc::now(),
                notes: None,
            })
            .unwrap();
        let root = vault.root().to_path_buf();
        drop(vault);

        let reopened = Vault::open(&root).unwrap();
        assert!(reopened.contacts().is_known("vault_friend"));
        assert!(!reopened.contacts().should_quarantine("vault_friend"));
    }

    #[test]
    fn test_save_message_idempotent() {
        let (_dir, vault) = temp_vault();
        let message = json!({"envelope": {"id": "msg_dup"}});

        vault
            .save_message(Direction::Received, "msg_dup", &message)
            .unwrap();
        vault
            .save_message(Direction::Received, "msg_dup", &message)
            .unwrap();

        assert_eq!(vault.history(10).unwrap().len(), 1);
    }

    #[test]
    fn test_same_id_both_directions_kept_separately() {
        let (_dir, vault) = temp_vault();
        let message = json!({"envelope": {"id": "msg_echo"}});

        vault
            .save_message(Direction::Sent, "msg_echo", &message)
            .unwrap();
        vault
            .save_message(Direction::Received, "msg_echo", &message)
            .unwrap();

        assert_eq!(vault.history(10).unwrap().len(), 2);
    }

    #[test]
    fn test_quarantine_store() {
        let (_dir, vault) = temp_vault();
        vault
            .save_to_quarantine("msg_sus", "unknown_sender", &json!({}))
            .unwrap();

        let records = vault.quarantine(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, "unknown_sender");
        assert!(vault.history(10).unwrap().is_empty());
    }
}
