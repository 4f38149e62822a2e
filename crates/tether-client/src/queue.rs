//! Offline buffer for fire-and-forget traffic.
//!
//! Envelopes accepted while not connected wait here and are flushed in
//! insertion order immediately after the connected transition, before any
//! new application sends for that cycle. Correlated requests are never
//! queued; they are rejected up front.

use std::collections::VecDeque;

use tether_core::Envelope;

/// FIFO buffer of envelopes awaiting a connection.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<Envelope>,
}

impl OutboundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an envelope, preserving issue order.
    pub fn push(&mut self, envelope: Envelope) {
        self.items.push_back(envelope);
    }

    /// Put an envelope back at the head after a failed flush write.
    pub fn push_front(&mut self, envelope: Envelope) {
        self.items.push_front(envelope);
    }

    /// Take the oldest queued envelope.
    pub fn pop(&mut self) -> Option<Envelope> {
        self.items.pop_front()
    }

    /// Take every queued envelope in insertion order.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.items.drain(..).collect()
    }

    /// Number of queued envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drain_preserves_insertion_order() {
        let mut queue = OutboundQueue::new();
        for i in 0..5 {
            queue.push(Envelope::broadcast("seq", json!({"i": i})));
        }
        let drained = queue.drain();
        assert_eq!(drained.len(), 5);
        for (i, env) in drained.iter().enumerate() {
            assert_eq!(env.payload["i"], i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_empty_queue() {
        let mut queue = OutboundQueue::new();
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn push_after_drain_starts_fresh() {
        let mut queue = OutboundQueue::new();
        queue.push(Envelope::broadcast("a", json!(1)));
        let _ = queue.drain();

        queue.push(Envelope::broadcast("b", json!(2)));
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].message_type, "b");
    }

    #[test]
    fn push_front_restores_head_position() {
        let mut queue = OutboundQueue::new();
        for tag in ["a", "b", "c"] {
            queue.push(Envelope::broadcast(tag, json!(1)));
        }

        // Take the head, then put it back (the failed-write path).
        let head = queue.pop().unwrap();
        assert_eq!(head.message_type, "a");
        queue.push_front(head);

        let order: Vec<String> = queue.drain().into_iter().map(|e| e.message_type).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn len_tracks_pushes() {
        let mut queue = OutboundQueue::new();
        assert_eq!(queue.len(), 0);
        queue.push(Envelope::broadcast("a", json!(1)));
        queue.push(Envelope::broadcast("b", json!(2)));
        assert_eq!(queue.len(), 2);
    }
}
