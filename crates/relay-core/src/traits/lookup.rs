//! Transport state resolution capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::id::ConnectionId;

/// Snapshot of a connection's authoritative transport state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportInfo {
    /// Current transport-level state string (e.g. "open", "closing").
    pub state: String,
}

impl TransportInfo {
    /// Convenience constructor.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }
}

/// Resolves the current transport state for a connection.
///
/// Returning `None` means the outer system has forgotten the connection;
/// callers treat that as authoritative and drop their own bookkeeping.
#[async_trait]
pub trait ConnectionLookup: Send + Sync {
    /// Resolve the transport state for a connection, or report it gone.
    async fn lookup(&self, connection_id: &ConnectionId) -> Option<TransportInfo>;
}
