//! Memory metric snapshots and report types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of memory state, collected once per cleanup tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Process resident memory in megabytes.
    pub total_memory_mb: f64,
    /// Total tracked connection-buffer memory in megabytes.
    pub connection_memory_mb: f64,
    /// Number of registered connections.
    pub active_connections: usize,
    /// Messages tracked since startup.
    pub total_allocations: u64,
    /// Cleanup passes completed since startup.
    pub gc_collections: u64,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// Result of a forced cleanup pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Stale connections unregistered.
    pub cleaned_connections: usize,
    /// Metric snapshots purged past the retention window.
    pub cleaned_metrics: usize,
    /// Buffer memory released, in megabytes.
    pub freed_memory_mb: f64,
    /// Wall time the pass took, in seconds.
    pub cleanup_time_seconds: f64,
}

/// A single detected memory health issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryIssue {
    /// Issue identifier ("high_memory_usage", "high_connection_count",
    /// "memory_growth").
    pub issue: String,
    /// Severity: "high" or "medium".
    pub severity: String,
    /// The observed value that tripped the rule.
    pub current_value: f64,
    /// The configured threshold.
    pub threshold: f64,
}

/// Health verdict against the latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHealth {
    /// "healthy" iff no issues were found, otherwise "degraded".
    pub status: String,
    /// Detected issues, possibly empty.
    pub issues: Vec<MemoryIssue>,
}

/// Per-connection buffer detail for the stats report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionBufferDetail {
    /// Tracked message count.
    pub message_count: usize,
    /// Cached buffer size in megabytes.
    pub buffer_size_mb: f64,
}

/// Configured bounds, echoed in the stats report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferLimits {
    /// Maximum tracked messages per connection.
    pub max_messages_per_connection: usize,
    /// Maximum cached buffer size per connection in megabytes.
    pub max_buffer_size_mb: f64,
}

/// Full memory stats report.
///
/// Field names are load-bearing for dashboards and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Latest snapshot, if one has been collected.
    pub current_metrics: Option<MemoryMetrics>,
    /// Per-connection buffer details keyed by connection id.
    pub connection_details: HashMap<String, ConnectionBufferDetail>,
    /// Configured limits.
    pub buffer_limits: BufferLimits,
    /// Number of retained metric snapshots.
    pub metrics_history_count: usize,
    /// Whether the background cleanup loop is running.
    pub monitoring_active: bool,
}
