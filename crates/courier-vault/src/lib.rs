//! The courier vault: an agent's on-disk identity and message store.
//!
//! One directory holds everything an agent is: its key pairs, its
//! public identity, its contact book with the trust policy, and the
//! history/quarantine stores. Private keys never cross the vault
//! boundary; callers hand bytes in for signing and sealed payloads in
//! for opening.
//!
//! Layout:
//!
//! ```text
//! <vault dir>/
//!   identity.json        public identity + per-server registrations
//!   signing_key.bin      Ed25519 private key, mode 0600
//!   encryption_key.bin   X25519 private key, mode 0600
//!   contacts.json        contact book + quarantine policy
//!   history/             sent and received messages
//!   quarantine/          messages held back by the trust policy
//! ```
//!
//! State files are replaced atomically (temp file + rename), so a
//! concurrent reader always observes a complete old or new file,
//! never a partial write. There is no vault-wide advisory lock:
//! when two processes mutate the same vault, writes race at
//! whole-file granularity and the last write wins. History and
//! quarantine are safe regardless (each message is its own file with
//! a deterministic name); identity and contacts mutations should come
//! from a single process at a time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contacts;
pub mod error;
mod fs;
pub mod history;
pub mod identity;
pub mod vault;

pub use contacts::{Contact, ContactBook};
pub use error::{Result, VaultError};
pub use history::{Direction, HistoryRecord, QuarantineRecord};
pub use identity::{derive_vault_id, Identity, Registration};
pub use vault::Vault;
