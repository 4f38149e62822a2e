//! Wire-level message envelope.
//!
//! Every frame on the duplex channel is a JSON object:
//!
//! ```json
//! { "type": "...", "payload": ..., "timestamp": 1756500000000, "id": "..."? }
//! ```
//!
//! `id` is present only on correlated requests and their responses. The
//! payload is opaque to the connection layer; schema validation beyond the
//! envelope shape is deliberately out of scope.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RequestId;

/// Envelope `type` used by heartbeat probes.
pub const PING_TYPE: &str = "ping";

/// A single message on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type tag (routing key for broadcasts).
    #[serde(rename = "type")]
    pub message_type: String,
    /// Opaque application payload.
    pub payload: Value,
    /// Creation time, epoch milliseconds.
    pub timestamp: u64,
    /// Correlation id, present only on request/response pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Envelope {
    /// Build a fire-and-forget envelope stamped with the current time.
    #[must_use]
    pub fn broadcast(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            timestamp: now_millis(),
            id: None,
        }
    }

    /// Build a correlated request envelope with a fresh [`RequestId`].
    #[must_use]
    pub fn request(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            timestamp: now_millis(),
            id: Some(RequestId::new()),
        }
    }

    /// Build a heartbeat probe envelope.
    #[must_use]
    pub fn ping() -> Self {
        Self::request(PING_TYPE, Value::Null)
    }

    /// Whether this envelope expects (or answers) a correlated reply.
    #[must_use]
    pub fn is_correlated(&self) -> bool {
        self.id.is_some()
    }

    /// Serialize to the wire text form.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an envelope off the wire.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Current time as epoch milliseconds.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn broadcast_has_no_id() {
        let env = Envelope::broadcast("metrics.update", json!({"cpu": 0.4}));
        assert_eq!(env.message_type, "metrics.update");
        assert!(env.id.is_none());
        assert!(!env.is_correlated());
        assert!(env.timestamp > 0);
    }

    #[test]
    fn request_has_fresh_id() {
        let a = Envelope::request("echo", json!({"x": 1}));
        let b = Envelope::request("echo", json!({"x": 1}));
        assert!(a.is_correlated());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn ping_envelope_shape() {
        let env = Envelope::ping();
        assert_eq!(env.message_type, PING_TYPE);
        assert!(env.is_correlated());
        assert_eq!(env.payload, Value::Null);
    }

    #[test]
    fn wire_shape_omits_absent_id() {
        let env = Envelope {
            message_type: "note".into(),
            payload: json!("hi"),
            timestamp: 1000,
            id: None,
        };
        let json = env.encode().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "note");
        assert_eq!(parsed["payload"], "hi");
        assert_eq!(parsed["timestamp"], 1000);
        assert!(parsed.get("id").is_none());
    }

    #[test]
    fn wire_shape_includes_id_when_present() {
        let env = Envelope {
            message_type: "echo".into(),
            payload: json!({"x": 1}),
            timestamp: 5,
            id: Some(RequestId::from("req_1")),
        };
        let parsed: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(parsed["id"], "req_1");
    }

    #[test]
    fn decode_roundtrip() {
        let env = Envelope::request("echo", json!({"nested": {"k": [1, 2]}}));
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn decode_rejects_missing_type() {
        let err = Envelope::decode(r#"{"payload": null, "timestamp": 1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn decode_tolerates_unknown_fields() {
        let env =
            Envelope::decode(r#"{"type":"t","payload":1,"timestamp":2,"extra":true}"#).unwrap();
        assert_eq!(env.message_type, "t");
    }
}
