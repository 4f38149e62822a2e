//! Connection state machine.
//!
//! Legal transitions:
//!
//! ```text
//! Disconnected → Connecting → Connected
//! Connected → Reconnecting → Connected | Error
//! any state → Disconnected   (explicit disconnect)
//! Error → Connecting         (manual connect after exhaustion)
//! ```
//!
//! `Disconnected` is the initial state. `Error` is terminal until a manual
//! `connect()` call.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the logical connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport open; nothing scheduled.
    #[default]
    Disconnected,
    /// A dial is in flight for an explicit `connect()`.
    Connecting,
    /// Transport open and healthy.
    Connected,
    /// Transport lost; automatic retries in progress.
    Reconnecting,
    /// Reconnect attempts exhausted; waiting for a manual `connect()`.
    Error,
}

impl ConnectionState {
    /// Whether a transport handle may be open in this state.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the driver has retry work scheduled or in flight.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Whether `to` is a legal next state.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        // Explicit disconnect is allowed from anywhere.
        if to == Self::Disconnected {
            return true;
        }
        matches!(
            (self, to),
            (Self::Disconnected | Self::Error, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Reconnecting | Self::Error)
                | (Self::Connected, Self::Reconnecting)
                | (Self::Reconnecting, Self::Connected | Self::Error)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}
