//! Error hierarchy for the tether client.
//!
//! Two layers, both built on [`thiserror`]:
//!
//! - [`TransportError`]: socket-level failures (dial, abnormal close, I/O).
//!   Handled internally by the reconnection policy and only escalated when
//!   attempts are exhausted.
//! - [`ClientError`]: caller-facing failures. Request-level errors
//!   (`Timeout`, `NotConnected`, `ConnectionClosed`) are always surfaced to
//!   the specific caller awaiting that request, never swallowed.

use thiserror::Error;

use crate::ids::RequestId;

/// Socket-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The dial failed before a transport was established.
    #[error("failed to open transport to {url}: {reason}")]
    ConnectFailed {
        /// Target endpoint.
        url: String,
        /// Underlying failure description.
        reason: String,
    },
    /// The transport closed without a graceful close handshake.
    #[error("transport closed abnormally: {reason}")]
    AbnormalClose {
        /// Close reason or code description.
        reason: String,
    },
    /// Read or write failed on an open transport.
    #[error("transport i/o error: {0}")]
    Io(String),
}

/// Caller-facing error for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure, surfaced after retries are exhausted or when a
    /// write fails outright.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A correlated request received no reply within its window. Only that
    /// request fails; the connection is unaffected.
    #[error("request {id} timed out after {after_ms}ms")]
    Timeout {
        /// Correlation id of the expired request.
        id: RequestId,
        /// Configured timeout window.
        after_ms: u64,
    },

    /// A correlated request was issued while not connected. Such requests
    /// are rejected immediately and never queued: the timeout clock would
    /// be meaningless while offline.
    #[error("not connected")]
    NotConnected,

    /// Reconnect attempts are exhausted; the client is in the error state
    /// until a manual `connect()`.
    #[error("max reconnect attempts reached after {attempts} attempts")]
    MaxAttemptsReached {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The connection was torn down while the operation was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// Envelope could not be encoded or decoded.
    #[error("envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A settings value was invalid (e.g., out of range).
    #[error("invalid settings value: {0}")]
    InvalidSettings(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Whether this error ends the connection (as opposed to one request).
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::MaxAttemptsReached { .. } | Self::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn transport_error_display() {
        let err = TransportError::ConnectFailed {
            url: "ws://localhost:9".into(),
            reason: "refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ws://localhost:9"));
        assert!(msg.contains("refused"));
    }

    #[test]
    fn timeout_display_includes_window() {
        let err = ClientError::Timeout {
            id: RequestId::from("req_1"),
            after_ms: 10_000,
        };
        assert_eq!(err.to_string(), "request req_1 timed out after 10000ms");
    }

    #[test]
    fn transport_from_conversion() {
        let inner = TransportError::Io("broken pipe".into());
        let err: ClientError = inner.into();
        assert_matches!(err, ClientError::Transport(TransportError::Io(_)));
    }

    #[test]
    fn serialization_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: ClientError = json_err.into();
        assert_matches!(err, ClientError::Serialization(_));
    }

    #[test]
    fn fatality_classification() {
        assert!(ClientError::ConnectionClosed.is_connection_fatal());
        assert!(ClientError::MaxAttemptsReached { attempts: 10 }.is_connection_fatal());
        assert!(!ClientError::NotConnected.is_connection_fatal());
        assert!(!ClientError::Timeout {
            id: RequestId::new(),
            after_ms: 1
        }
        .is_connection_fatal());
    }
}
