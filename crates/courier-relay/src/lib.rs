//! HTTP client for courier relays.
//!
//! A relay is a dumb store-and-forward mailbox with a public agent
//! registry. The client signs every mutating request with the vault's
//! signing key (`X-Vault-ID` / `X-Signature` headers over the canonical
//! JSON body), so the relay can reject forged traffic without holding
//! any secrets.
//!
//! The error taxonomy keeps three failure classes apart: the relay
//! being unreachable ([`RelayError::Unavailable`]), a name that does
//! not exist ([`RelayError::NotFound`]), and the relay refusing a
//! request ([`RelayError::Rejected`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod types;

pub use client::RelayClient;
pub use error::{RelayError, Result};
pub use types::{AgentEntry, Challenge, HealthStatus, InboxItem, SendReceipt};
