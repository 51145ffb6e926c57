//! Reconnection state machine types and records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relay_core::types::id::ConnectionId;
use relay_core::RelayResult;

/// Reconnection state machine.
///
/// DISCONNECTED → RECONNECTING → (CONNECTING → CONNECTED) | FAILED.
/// FAILED and DISABLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectState {
    Disconnected,
    Reconnecting,
    Connecting,
    Connected,
    Failed,
    Disabled,
}

impl ReconnectState {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Disabled => "disabled",
        }
    }

    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Disabled)
    }
}

/// One recorded reconnection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectionAttempt {
    /// 1-based attempt number within the current reconnection run.
    pub attempt_number: u32,
    /// When the attempt started.
    pub timestamp: DateTime<Utc>,
    /// Backoff delay that preceded the attempt, in milliseconds.
    pub delay_ms: u64,
    /// Whether the connect capability succeeded.
    pub success: bool,
    /// Error message for failed attempts.
    pub error: Option<String>,
    /// Time the connect call took, in milliseconds.
    pub duration_ms: u64,
}

/// Running per-connection aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconnectionMetrics {
    /// Disconnect events seen.
    pub total_disconnects: u64,
    /// Reconnection attempts made.
    pub total_attempts: u64,
    /// Attempts that connected.
    pub successful_reconnects: u64,
    /// Attempts that failed.
    pub failed_attempts: u64,
    /// Mean disconnect-to-connected time across successes, in
    /// milliseconds.
    pub avg_reconnect_time_ms: f64,
    /// Longest observed disconnect-to-connected time, in milliseconds.
    pub longest_downtime_ms: u64,
    /// Disconnect counts keyed by reason string.
    pub disconnect_reason_counts: HashMap<String, u64>,
    /// Most recent disconnect.
    pub last_disconnect_time: Option<DateTime<Utc>>,
    /// Most recent successful reconnect.
    pub last_success_time: Option<DateTime<Utc>>,
}

/// Status report for one connection.
///
/// Field names are load-bearing for dashboards and must not change.
/// Only the most recent 10 attempts are exposed; the full history is
/// retained internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectionStatus {
    pub connection_id: String,
    pub state: String,
    pub current_attempt: u32,
    pub max_attempts: u32,
    pub permanent_failure: bool,
    pub reconnection_enabled: bool,
    pub last_disconnect_time: Option<DateTime<Utc>>,
    pub last_successful_connect_time: Option<DateTime<Utc>>,
    pub next_attempt_delay_ms: u64,
    pub recent_attempts: Vec<ReconnectionAttempt>,
}

/// Observer for reconnection state transitions.
///
/// Observers are invoked sequentially; an observer returning `Err` is
/// logged and never blocks the remaining observers or the state machine.
#[async_trait]
pub trait ReconnectObserver: Send + Sync {
    /// Called on every state transition.
    async fn on_state_change(
        &self,
        connection_id: &ConnectionId,
        state: ReconnectState,
        attempt: u32,
    ) -> RelayResult<()>;
}
