//! Branded ID newtype for correlated requests.
//!
//! Correlated request/response pairs share a `RequestId`. IDs are UUID v7
//! (time-ordered) generated via [`uuid::Uuid::now_v7`], which makes them
//! collision-resistant across reconnect cycles: an id is never reused while
//! its pending request is live.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier shared by a correlated request and its response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Create from an existing string value (e.g. parsed off the wire).
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_time_ordered() {
        // UUID v7 sorts lexicographically by creation time.
        let a = RequestId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = RequestId::new();
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn from_string_roundtrip() {
        let id = RequestId::from_string("req_123".into());
        assert_eq!(id.as_str(), "req_123");
        assert_eq!(id.into_inner(), "req_123");
    }

    #[test]
    fn serde_transparent() {
        let id = RequestId::from("req_9");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"req_9\"");
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_matches_inner() {
        let id = RequestId::from("abc");
        assert_eq!(id.to_string(), "abc");
    }
}
