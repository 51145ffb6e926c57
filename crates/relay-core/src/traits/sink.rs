//! Outbound delivery capability.

use async_trait::async_trait;
use serde_json::Value;

use crate::result::RelayResult;
use crate::types::id::ConnectionId;

/// Delivers a serialized envelope to one connection.
///
/// Implementations are assumed potentially slow or blocking; callers must
/// not hold shared locks across the await. A failed send is reported via
/// `Err` and the caller decides whether to retry.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    /// Deliver an envelope to the given connection.
    async fn send(&self, connection_id: &ConnectionId, envelope: Value) -> RelayResult<()>;
}
