//! Broadcast channel carrying stream events from the network task to every
//! attached consumer.
//!
//! Each subscriber owns an unbounded queue, so publishing never waits and
//! events stay in publish order per subscriber. Nothing is retained for
//! subscribers that attach later: an event published with no one attached is
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::trace;

use crate::core::chat_stream::{StreamEvent, TurnId};

type Envelope = (StreamEvent, TurnId);

#[derive(Default)]
struct RelayState {
    next_subscriber_id: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<Envelope>)>,
}

fn lock(state: &Mutex<RelayState>) -> MutexGuard<'_, RelayState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct EventRelay {
    state: Arc<Mutex<RelayState>>,
}

impl EventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        state.next_subscriber_id += 1;
        let id = state.next_subscriber_id;
        state.subscribers.push((id, tx));
        trace!(subscriber = id, "relay subscriber attached");

        Subscription {
            id,
            rx,
            relay: Arc::downgrade(&self.state),
        }
    }

    /// Deliver `event` to every attached subscriber and return how many
    /// received it.
    pub fn publish(&self, event: StreamEvent, turn_id: TurnId) -> usize {
        let mut state = lock(&self.state);
        state
            .subscribers
            .retain(|(_, tx)| tx.send((event.clone(), turn_id)).is_ok());

        let delivered = state.subscribers.len();
        if delivered == 0 {
            trace!(turn_id, ?event, "no relay subscribers; event dropped");
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }
}

/// Receiving end of an [`EventRelay`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Envelope>,
    relay: Weak<Mutex<RelayState>>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the relay itself is gone
    /// and every queued event has been drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.relay.upgrade() {
            lock(&state).subscribers.retain(|(id, _)| *id != self.id);
            trace!(subscriber = self.id, "relay subscriber detached");
        }
    }
}
