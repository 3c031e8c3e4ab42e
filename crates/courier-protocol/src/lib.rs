//! Courier message protocol.
//!
//! Defines the envelope/payload data model, the builder that produces
//! valid messages, and the canonical JSON form that signatures cover.
//! The wire format is JSON end-to-end; any agent that can produce the
//! canonical bytes can interoperate regardless of implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod envelope;
pub mod error;
pub mod limits;

pub use canonical::{canonical_bytes, signable_content, signable_content_of_value};
pub use envelope::{ContentType, Envelope, Message, MessageBuilder, MessageType, Payload};
pub use error::{ProtocolError, Result};
