//! Typed event fan-out to subscribers.
//!
//! Events are a closed set ([`ClientEvent`]) rather than stringly-typed
//! names. Subscribers pick a scope with [`EventFilter`]: everything, state
//! changes only, all inbound messages, or messages of one `type` tag.
//!
//! Subscriptions hold an unbounded receiver; a slow subscriber never blocks
//! the driver. Unsubscribing is idempotent, and dropping a [`Subscription`]
//! unsubscribes implicitly (closed channels are pruned on the next publish).

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use tether_core::{ConnectionState, Envelope};

/// Notifications published by the client driver.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// The connection state machine moved.
    StateChanged {
        /// State before the transition.
        old: ConnectionState,
        /// State after the transition.
        new: ConnectionState,
    },
    /// An inbound frame that was not a correlated reply.
    Message(Envelope),
    /// Reconnect attempts are exhausted; the client entered the error state.
    MaxReconnectAttemptsReached,
}

/// Scope of a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Only [`ClientEvent::StateChanged`].
    StateChanges,
    /// Every [`ClientEvent::Message`].
    Messages,
    /// Only messages whose envelope `type` equals the given tag.
    MessageType(String),
}

impl EventFilter {
    fn matches(&self, event: &ClientEvent) -> bool {
        match (self, event) {
            (Self::All, _) => true,
            (Self::StateChanges, ClientEvent::StateChanged { .. }) => true,
            (Self::Messages, ClientEvent::Message(_)) => true,
            (Self::MessageType(tag), ClientEvent::Message(env)) => env.message_type == *tag,
            _ => false,
        }
    }
}

struct SubEntry {
    id: u64,
    filter: EventFilter,
    tx: mpsc::UnboundedSender<ClientEvent>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subs: Vec<SubEntry>,
}

/// Publish/subscribe hub for [`ClientEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for events matching `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subs.push(SubEntry { id, filter, tx });
        Subscription {
            id,
            rx,
            bus: Arc::clone(&self.inner),
        }
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Entries whose receiver has gone away are pruned here.
    pub fn publish(&self, event: &ClientEvent) {
        let mut inner = self.inner.lock();
        inner.subs.retain(|sub| {
            if !sub.filter.matches(event) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subs.len()
    }
}

/// Handle to a registered subscriber.
///
/// Receive events with [`Subscription::recv`]; drop or call
/// [`Subscription::unsubscribe`] to detach.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ClientEvent>,
    bus: Arc<Mutex<BusInner>>,
}

impl Subscription {
    /// Await the next matching event. Returns `None` once unsubscribed and
    /// the buffer is drained.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive of an already-delivered event.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }

    /// Detach from the bus. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.bus.lock().subs.retain(|sub| sub.id != self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
