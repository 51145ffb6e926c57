//! Message batcher configuration.

use serde::{Deserialize, Serialize};

/// Bounds under which outbound messages are accumulated before a flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum messages per batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Maximum age of an open batch in milliseconds before a time flush.
    #[serde(default = "default_max_wait")]
    pub max_wait_time_ms: u64,
    /// Maximum batch payload size in kilobytes.
    #[serde(default = "default_max_memory_kb")]
    pub max_batch_memory_kb: usize,
    /// Priority at or above which a batch is flushed immediately.
    #[serde(default = "default_priority_threshold")]
    pub priority_threshold: i64,
    /// Whether high-priority messages trigger an immediate flush.
    #[serde(default = "default_true")]
    pub flush_on_high_priority: bool,
    /// Cadence of the background sweep that flushes idle aged batches.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_wait_time_ms: default_max_wait(),
            max_batch_memory_kb: default_max_memory_kb(),
            priority_threshold: default_priority_threshold(),
            flush_on_high_priority: default_true(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_max_batch_size() -> usize {
    50
}

fn default_max_wait() -> u64 {
    100
}

fn default_max_memory_kb() -> usize {
    500
}

fn default_priority_threshold() -> i64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    50
}
