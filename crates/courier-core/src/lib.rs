//! Courier workflows.
//!
//! Ties the vault, the protocol and the relay client together into the
//! three operations agents actually run: send a message, drain the
//! inbox (once or on a poll loop), and bootstrap an identity on first
//! use. Everything here is policy; the mechanics live in the leaf
//! crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod receive;
pub mod send;
pub mod setup;
pub mod shutdown;

pub use error::{CoreError, Result};
pub use receive::{
    fetch_and_process, poll, receive_once, MessageReport, ReceiveOptions, ReceiveRun,
    SenderDirectory,
};
pub use send::{send_message, SendOptions, SentMessage};
pub use setup::{ensure_ready, generate_alias};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownHandle};
