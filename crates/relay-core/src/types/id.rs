//! Typed connection identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a logical connection.
///
/// Identity is issued by the surrounding transport layer; this core never
/// interprets its contents, it only keys per-connection state by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a connection id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_inner() {
        let id = ConnectionId::new("conn-42");
        assert_eq!(id.to_string(), "conn-42");
        assert_eq!(id.as_str(), "conn-42");
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = ConnectionId::from("ws-abc");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"ws-abc\"");
        let parsed: ConnectionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }
}
