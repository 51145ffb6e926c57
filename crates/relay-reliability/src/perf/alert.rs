//! Alerts and the alert observer interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relay_core::RelayResult;

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A raised threshold violation.
///
/// At most one unresolved alert exists per metric_name at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Rule identifier, e.g. "high_response_time".
    pub metric_name: String,
    /// Severity level.
    pub severity: AlertSeverity,
    /// Human-readable description.
    pub message: String,
    /// The configured threshold.
    pub threshold: f64,
    /// The observed value at creation time.
    pub current_value: f64,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Whether the alert has been explicitly resolved.
    pub resolved: bool,
}

/// Observer for raised alerts.
///
/// Handlers are invoked sequentially; a handler returning `Err` is logged
/// and never blocks the remaining handlers or the producer.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Called once per newly raised alert.
    async fn on_alert(&self, alert: &Alert) -> RelayResult<()>;
}
