//! Per-connection sync checkpoints and drift events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relay_core::types::id::ConnectionId;
use relay_core::RelayResult;

/// Sync verdict for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Desynced,
    Syncing,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Desynced => "desynced",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
        }
    }
}

/// Cached belief about one connection's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCheckpoint {
    /// Transport state string as last observed.
    pub cached_transport_state: String,
    /// This subsystem's own state label.
    pub internal_state: String,
    /// Last time real traffic was seen on the connection.
    pub last_activity: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

impl StateCheckpoint {
    pub fn new(transport_state: impl Into<String>) -> Self {
        let state = transport_state.into();
        Self {
            internal_state: state.clone(),
            cached_transport_state: state,
            last_activity: Utc::now(),
            sync_status: SyncStatus::Synced,
        }
    }
}

/// Why a connection was flagged desynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Observed transport state diverged from the cached one.
    StateDesync,
    /// No activity for longer than the desync threshold.
    ActivityTimeout,
}

impl SyncEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateDesync => "state_desync",
            Self::ActivityTimeout => "activity_timeout",
        }
    }
}

/// Observer for desync events.
///
/// Handlers run sequentially; a handler returning `Err` is logged and
/// never blocks the remaining handlers or the check itself.
#[async_trait]
pub trait SyncEventHandler: Send + Sync {
    async fn on_desync(
        &self,
        connection_id: &ConnectionId,
        event: SyncEvent,
        checkpoint: &StateCheckpoint,
    ) -> RelayResult<()>;
}

/// Aggregate synchronizer report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_monitored_connections: usize,
    pub synced_connections: usize,
    pub desynced_connections: usize,
    /// Fraction of tracked connections currently synced; 1.0 when
    /// nothing is tracked.
    pub sync_rate: f64,
    pub monitoring_active: bool,
}
