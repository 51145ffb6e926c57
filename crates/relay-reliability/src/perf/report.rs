//! Performance report types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relay_core::config::MonitorThresholds;

use super::alert::Alert;
use super::point::MetricPoint;

/// Response-time percentile block of the summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseTimeSummary {
    pub average_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

/// Aggregate stats over a set of points.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricStats {
    pub(crate) fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sum: f64 = values.iter().sum();
        Self {
            count: values.len(),
            mean: sum / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Active-alert counts by severity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveAlerts {
    pub total: usize,
    pub by_severity: HashMap<String, usize>,
}

/// Current performance summary.
///
/// Field names are load-bearing for dashboards and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub timestamp: DateTime<Utc>,
    pub response_time: ResponseTimeSummary,
    pub throughput_messages_per_second: f64,
    pub total_connections: usize,
    pub active_alerts: ActiveAlerts,
    pub system_metrics: HashMap<String, MetricStats>,
    pub error_counts: HashMap<String, u64>,
    pub monitoring_active: bool,
}

/// Per-metric block of the detailed window report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricReport {
    pub stats: MetricStats,
    /// Up to the last 100 raw points of the window.
    pub recent_points: Vec<MetricPoint>,
}

/// Detailed report over a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedReport {
    pub window_seconds: u64,
    pub metrics: HashMap<String, MetricReport>,
    /// Alerts raised inside the window.
    pub alerts: Vec<Alert>,
}

/// Full export: thresholds plus both reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsExport {
    pub thresholds: MonitorThresholds,
    pub summary: PerformanceSummary,
    pub detailed: DetailedReport,
    /// Points recorded since startup or the last reset.
    pub total_points_recorded: u64,
}
