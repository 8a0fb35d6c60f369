//! Origin-scoped broadcast bus.
//!
//! A named publish/subscribe channel shared by every execution context of
//! one origin. Each handle receives every message sent by any *other*
//! handle; self-delivery is filtered by stamping outbound messages with the
//! sending handle's identity. A handle can `branch()` a fresh subscription
//! that shares its identity, so a helper task spawned by an instance counts
//! as the same participant, not a new one.

use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::config::BusConfig;
use crate::error::{Result, TillerError};

/// A message stamped with the sender's handle identity.
#[derive(Debug, Clone)]
struct Stamped<M> {
    from: Uuid,
    message: M,
}

/// A named broadcast channel. Cloning shares the same underlying bus.
#[derive(Debug, Clone)]
pub struct Bus<M> {
    name: String,
    tx: broadcast::Sender<Stamped<M>>,
}

impl<M: Clone> Bus<M> {
    /// Create a new bus. The name only appears in diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _rx) = broadcast::channel(BusConfig::CAPACITY);
        Bus {
            name: name.into(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a handle with a fresh identity.
    ///
    /// The subscription starts now: messages sent before `open` are never
    /// observed by the new handle.
    pub fn open(&self) -> BusHandle<M> {
        let publisher = self.publisher();
        BusHandle {
            rx: self.tx.subscribe(),
            publisher,
        }
    }

    /// A send-only handle for contexts that never listen.
    pub fn publisher(&self) -> Publisher<M> {
        Publisher {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            tx: self.tx.clone(),
        }
    }
}

/// Send-only bus access with its own identity.
#[derive(Debug, Clone)]
pub struct Publisher<M> {
    id: Uuid,
    name: String,
    tx: broadcast::Sender<Stamped<M>>,
}

impl<M: Clone> Publisher<M> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publish to all current subscribers.
    ///
    /// Sending while nothing is subscribed drops the message silently; the
    /// protocols riding the bus treat silence as an answer in itself.
    pub fn send(&self, message: M) {
        let _ = self.tx.send(Stamped {
            from: self.id,
            message,
        });
    }
}

/// A subscribed bus endpoint: sends under one identity, receives everything
/// published under any other identity.
#[derive(Debug)]
pub struct BusHandle<M> {
    publisher: Publisher<M>,
    rx: broadcast::Receiver<Stamped<M>>,
}

impl<M: Clone> BusHandle<M> {
    pub fn id(&self) -> Uuid {
        self.publisher.id
    }

    pub fn send(&self, message: M) {
        self.publisher.send(message);
    }

    /// A fresh subscription sharing this handle's identity.
    ///
    /// The branch sees only messages published after this call, and never
    /// messages sent through this handle or any of its branches.
    pub fn branch(&self) -> BusHandle<M> {
        BusHandle {
            rx: self.publisher.tx.subscribe(),
            publisher: self.publisher.clone(),
        }
    }

    /// Receive without waiting.
    ///
    /// Returns `None` when nothing from another participant is buffered.
    /// Used to sweep a subscription for messages that raced a deadline.
    pub fn try_recv(&mut self) -> Option<M> {
        loop {
            match self.rx.try_recv() {
                Ok(stamped) => {
                    if stamped.from == self.publisher.id {
                        continue;
                    }
                    return Some(stamped.message);
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(
                        bus = %self.publisher.name,
                        skipped,
                        "bus subscription lagged, skipping missed messages"
                    );
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Receive the next message from another participant.
    ///
    /// A lagging subscription skips the messages it missed and keeps going.
    /// Waits indefinitely while the bus is quiet; callers needing a bound
    /// wrap this in [`crate::race::deadline`].
    pub async fn recv(&mut self) -> Result<M> {
        loop {
            match self.rx.recv().await {
                Ok(stamped) => {
                    if stamped.from == self.publisher.id {
                        continue;
                    }
                    return Ok(stamped.message);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        bus = %self.publisher.name,
                        skipped,
                        "bus subscription lagged, skipping missed messages"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TillerError::BusClosed);
                }
            }
        }
    }
}
