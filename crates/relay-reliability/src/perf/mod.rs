//! Continuous health observation with debounced alerting.

pub mod alert;
pub mod monitor;
pub mod point;
pub mod report;

pub use alert::{Alert, AlertHandler, AlertSeverity};
pub use monitor::PerformanceMonitor;
pub use point::{MetricKind, MetricPoint};
pub use report::{DetailedReport, MetricStats, MetricsExport, PerformanceSummary};
