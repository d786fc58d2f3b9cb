//! Process-wide cancellation signal.
//!
//! A [`ShutdownTrigger`] fires once; every cloned [`ShutdownSignal`] observes it.
//! Loops check the signal between units of work and never abort work in flight.

use tokio::sync::watch;

/// Firing side of the cancellation signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Observing side of the cancellation signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, ShutdownSignal { receiver })
}

impl ShutdownTrigger {
    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Get a new observer.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the signal fires.
    ///
    /// Also returns when the trigger is dropped, so an abandoned trigger
    /// cannot leave loops running forever.
    pub async fn cancelled(&mut self) {
        // wait_for only errors when the sender is gone
        let _ = self.receiver.wait_for(|cancelled| *cancelled).await;
    }
}
