//! Performance monitor configuration.

use serde::{Deserialize, Serialize};

/// Metric storage bounds, loop cadence, and alerting thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between threshold evaluation passes.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// Fixed capacity of the per-metric point ring.
    #[serde(default = "default_max_points")]
    pub max_points_per_metric: usize,
    /// Hours after which resolved alerts are purged.
    #[serde(default = "default_alert_retention")]
    pub alert_retention_hours: u64,
    /// Alerting thresholds.
    #[serde(default)]
    pub thresholds: MonitorThresholds,
}

/// Threshold values for the five alerting rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// Mean recent response time above this raises high_response_time.
    #[serde(default = "default_max_response_time")]
    pub max_response_time_ms: f64,
    /// Mean memory over 5 minutes above this raises high_memory_usage.
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: f64,
    /// Error events in the last minute above this raises high_error_rate.
    #[serde(default = "default_max_errors")]
    pub max_errors_per_minute: usize,
    /// Mean throughput over 5 minutes below this raises low_throughput.
    #[serde(default = "default_min_throughput")]
    pub min_throughput_per_second: f64,
    /// Mean CPU over 5 minutes above this raises high_cpu_usage.
    #[serde(default = "default_max_cpu")]
    pub max_cpu_percent: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            max_points_per_metric: default_max_points(),
            alert_retention_hours: default_alert_retention(),
            thresholds: MonitorThresholds::default(),
        }
    }
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            max_response_time_ms: default_max_response_time(),
            max_memory_mb: default_max_memory(),
            max_errors_per_minute: default_max_errors(),
            min_throughput_per_second: default_min_throughput(),
            max_cpu_percent: default_max_cpu(),
        }
    }
}

fn default_check_interval() -> u64 {
    5
}

fn default_max_points() -> usize {
    10_000
}

fn default_alert_retention() -> u64 {
    24
}

fn default_max_response_time() -> f64 {
    1000.0
}

fn default_max_memory() -> f64 {
    500.0
}

fn default_max_errors() -> usize {
    10
}

fn default_min_throughput() -> f64 {
    1.0
}

fn default_max_cpu() -> f64 {
    80.0
}
