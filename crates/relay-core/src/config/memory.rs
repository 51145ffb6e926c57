//! Memory manager configuration.

use serde::{Deserialize, Serialize};

/// Per-connection buffer bounding and cleanup-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum tracked messages per connection before FIFO eviction.
    #[serde(default = "default_max_messages")]
    pub max_messages_per_connection: usize,
    /// Maximum cached buffer size per connection in megabytes.
    #[serde(default = "default_max_buffer_mb")]
    pub max_buffer_size_mb: f64,
    /// Seconds between background cleanup passes.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Seconds to wait before retrying after a cleanup-loop error.
    #[serde(default = "default_error_retry")]
    pub error_retry_seconds: u64,
    /// Hours to retain memory metric snapshots.
    #[serde(default = "default_retention_hours")]
    pub metrics_retention_hours: u64,
    /// Per-connection memory above which health reports high_memory_usage.
    #[serde(default = "default_high_memory_mb")]
    pub high_memory_threshold_mb: f64,
    /// Active-connection count above which health reports
    /// high_connection_count.
    #[serde(default = "default_high_connections")]
    pub high_connection_threshold: usize,
    /// Snapshot-over-snapshot growth rate above which health reports
    /// memory_growth (0.10 = 10%).
    #[serde(default = "default_growth_rate")]
    pub growth_rate_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages_per_connection: default_max_messages(),
            max_buffer_size_mb: default_max_buffer_mb(),
            cleanup_interval_seconds: default_cleanup_interval(),
            error_retry_seconds: default_error_retry(),
            metrics_retention_hours: default_retention_hours(),
            high_memory_threshold_mb: default_high_memory_mb(),
            high_connection_threshold: default_high_connections(),
            growth_rate_threshold: default_growth_rate(),
        }
    }
}

fn default_max_messages() -> usize {
    1000
}

fn default_max_buffer_mb() -> f64 {
    10.0
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_error_retry() -> u64 {
    30
}

fn default_retention_hours() -> u64 {
    24
}

fn default_high_memory_mb() -> f64 {
    100.0
}

fn default_high_connections() -> usize {
    1000
}

fn default_growth_rate() -> f64 {
    0.10
}
