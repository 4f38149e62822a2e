//! Connection statistics.
//!
//! Mutated only by the client driver and the heartbeat probe; callers read
//! point-in-time snapshots.

use serde::{Deserialize, Serialize};

/// Counters for the lifetime of a client instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// When the current connection was established (epoch ms), if connected.
    pub connected_at: Option<u64>,
    /// Reconnection attempts scheduled since the last explicit `connect()`.
    pub reconnect_count: u32,
    /// Envelopes written to the transport.
    pub messages_sent: u64,
    /// Envelopes received from the transport.
    pub messages_received: u64,
    /// Bytes written to the transport (encoded envelope text).
    pub bytes_sent: u64,
    /// Bytes received from the transport.
    pub bytes_received: u64,
    /// When the last heartbeat pong arrived (epoch ms).
    pub last_heartbeat: Option<u64>,
    /// Last measured heartbeat round-trip time in milliseconds.
    pub latency_ms: Option<u64>,
}

impl ConnectionStats {
    /// Record an outbound envelope of `bytes` encoded length.
    pub fn record_sent(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record an inbound frame of `bytes` length.
    pub fn record_received(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// Record a heartbeat round trip.
    pub fn record_heartbeat(&mut self, at_millis: u64, latency_ms: u64) {
        self.last_heartbeat = Some(at_millis);
        self.latency_ms = Some(latency_ms);
    }
}
