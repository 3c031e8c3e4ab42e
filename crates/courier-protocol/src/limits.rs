//! Protocol limits and constants.
//!
//! Shared between the builder, the vault and the relay client so that
//! every layer rejects the same things.

/// Protocol version carried in every envelope.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Maximum size of a message in canonical form (64 KiB).
///
/// Enforced at build time and again on validate; relays enforce their
/// own copy of this limit server-side.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default message time-to-live in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Prefix of every message id.
pub const MESSAGE_ID_PREFIX: &str = "msg_";

/// Prefix of every vault id.
pub const VAULT_ID_PREFIX: &str = "vault_";
