//! Cooperative cancellation for long-running loops.
//!
//! The poll loop owns no signal handling; whoever drives it decides
//! what cancellation means (ctrl-c in the CLI, a supervisor elsewhere)
//! and triggers the handle. The loop checks between iterations, so an
//! in-flight batch always completes.

use tokio::sync::watch;

/// Sending half: trigger cancellation.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half: observe cancellation.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    ///
    /// Resolves immediately when already triggered, and also when every
    /// handle has been dropped (an abandoned loop should stop, not hang).
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Create a connected handle/token pair.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}
