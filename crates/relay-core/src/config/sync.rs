//! Connection state synchronizer configuration.

use serde::{Deserialize, Serialize};

/// Drift and staleness detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds without activity before a connection is flagged desynced.
    #[serde(default = "default_desync_threshold")]
    pub desync_threshold_seconds: u64,
    /// Seconds between background reconciliation passes.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            desync_threshold_seconds: default_desync_threshold(),
            check_interval_seconds: default_check_interval(),
        }
    }
}

fn default_desync_threshold() -> u64 {
    30
}

fn default_check_interval() -> u64 {
    10
}
