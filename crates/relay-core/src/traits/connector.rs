//! Connection establishment capability.

use async_trait::async_trait;

use crate::result::RelayResult;
use crate::types::id::ConnectionId;

/// Attempts to re-establish a dropped connection.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attempt to reconnect the given connection.
    async fn connect(&self, connection_id: &ConnectionId) -> RelayResult<()>;
}
