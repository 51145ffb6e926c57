//! Performance monitor — metric recording, threshold evaluation, and
//! debounced alerting.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use relay_core::config::MonitorConfig;
use relay_core::types::id::ConnectionId;

use super::alert::{Alert, AlertHandler, AlertSeverity};
use super::point::{percentile, windowed_count, windowed_mean, MetricKind, MetricPoint};
use super::report::{
    ActiveAlerts, DetailedReport, MetricReport, MetricStats, MetricsExport, PerformanceSummary,
    ResponseTimeSummary,
};

/// Well-known metric names the threshold rules evaluate.
const METRIC_RESPONSE_TIME: &str = "response_time";
const METRIC_MEMORY: &str = "memory_usage";
const METRIC_ERRORS: &str = "errors";
const METRIC_THROUGHPUT: &str = "throughput";
const METRIC_CPU: &str = "cpu_usage";
const METRIC_CONNECTIONS: &str = "active_connections";

/// Continuous health observation with debounced alerting.
pub struct PerformanceMonitor {
    /// Configuration and thresholds.
    config: MonitorConfig,
    /// Metric name → fixed-capacity point ring (oldest dropped).
    rings: DashMap<String, VecDeque<MetricPoint>>,
    /// All alerts, unresolved and resolved-but-unpurged.
    alerts: Mutex<Vec<Alert>>,
    /// Registered alert observers.
    handlers: Mutex<Vec<Arc<dyn AlertHandler>>>,
    /// Error counts per connection id.
    error_counts: DashMap<String, u64>,
    /// Points recorded since startup or last reset.
    total_points: AtomicU64,
    /// Whether the monitor loop is running.
    monitoring_active: AtomicBool,
    /// Shutdown signal for the monitor loop.
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    /// Handle of the monitor loop task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("tracked_metrics", &self.rings.len())
            .finish()
    }
}

impl PerformanceMonitor {
    /// Creates a new monitor. The evaluation loop is not started until
    /// [`PerformanceMonitor::start`] is called.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            rings: DashMap::new(),
            alerts: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            error_counts: DashMap::new(),
            total_points: AtomicU64::new(0),
            monitoring_active: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Registers an alert observer.
    pub async fn add_alert_handler(&self, handler: Arc<dyn AlertHandler>) {
        self.handlers.lock().await.push(handler);
    }

    /// Appends a point to the named metric's ring, dropping the oldest on
    /// overflow.
    pub fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        tags: HashMap<String, String>,
    ) {
        let mut ring = self.rings.entry(name.to_string()).or_default();
        if ring.len() >= self.config.max_points_per_metric {
            ring.pop_front();
        }
        ring.push_back(MetricPoint::now(kind, value, tags));
        self.total_points.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a counter event.
    pub fn record_counter(&self, name: &str, value: f64) {
        self.record(name, MetricKind::Counter, value, HashMap::new());
    }

    /// Records a gauge sample.
    pub fn record_gauge(&self, name: &str, value: f64) {
        self.record(name, MetricKind::Gauge, value, HashMap::new());
    }

    /// Records a timer sample.
    pub fn record_timer(&self, name: &str, value_ms: f64) {
        self.record(name, MetricKind::Timer, value_ms, HashMap::new());
    }

    /// Records a histogram sample.
    pub fn record_histogram(&self, name: &str, value: f64) {
        self.record(name, MetricKind::Histogram, value, HashMap::new());
    }

    /// Records one response-time observation in milliseconds.
    pub fn record_response_time(&self, value_ms: f64) {
        self.record_timer(METRIC_RESPONSE_TIME, value_ms);
    }

    /// Records one error event, optionally attributed to a connection.
    pub fn record_error(&self, connection_id: Option<&ConnectionId>) {
        self.record_counter(METRIC_ERRORS, 1.0);
        if let Some(id) = connection_id {
            *self.error_counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    /// Records a throughput sample in messages per second.
    pub fn record_throughput(&self, messages_per_second: f64) {
        self.record_gauge(METRIC_THROUGHPUT, messages_per_second);
    }

    /// Records a memory sample in megabytes.
    pub fn record_memory(&self, memory_mb: f64) {
        self.record_gauge(METRIC_MEMORY, memory_mb);
    }

    /// Records a CPU sample in percent.
    pub fn record_cpu(&self, cpu_percent: f64) {
        self.record_gauge(METRIC_CPU, cpu_percent);
    }

    /// Records the current active-connection count.
    pub fn record_connection_count(&self, count: usize) {
        self.record_gauge(METRIC_CONNECTIONS, count as f64);
    }

    /// Evaluates every threshold rule once and purges expired resolved
    /// alerts. Called by the monitor loop each tick; public for on-demand
    /// checks.
    pub async fn evaluate_thresholds(&self) {
        let now = Utc::now();
        let minute_ago = now - chrono::Duration::seconds(60);
        let five_min_ago = now - chrono::Duration::seconds(300);
        let thresholds = self.config.thresholds.clone();

        if let Some(mean) = self.metric_mean(METRIC_RESPONSE_TIME, minute_ago) {
            if mean > thresholds.max_response_time_ms {
                self.raise_alert(
                    "high_response_time",
                    AlertSeverity::High,
                    format!("Mean response time {mean:.1}ms exceeds threshold"),
                    thresholds.max_response_time_ms,
                    mean,
                )
                .await;
            }
        }

        if let Some(mean) = self.metric_mean(METRIC_MEMORY, five_min_ago) {
            if mean > thresholds.max_memory_mb {
                self.raise_alert(
                    "high_memory_usage",
                    AlertSeverity::High,
                    format!("Mean memory {mean:.1}MB exceeds threshold"),
                    thresholds.max_memory_mb,
                    mean,
                )
                .await;
            }
        }

        let error_count = self
            .rings
            .get(METRIC_ERRORS)
            .map(|ring| windowed_count(ring.make_contiguous_copy().as_slice(), minute_ago))
            .unwrap_or(0);
        if error_count > thresholds.max_errors_per_minute {
            self.raise_alert(
                "high_error_rate",
                AlertSeverity::Critical,
                format!("{error_count} errors in the last minute"),
                thresholds.max_errors_per_minute as f64,
                error_count as f64,
            )
            .await;
        }

        // The only below-threshold rule.
        if let Some(mean) = self.metric_mean(METRIC_THROUGHPUT, five_min_ago) {
            if mean < thresholds.min_throughput_per_second {
                self.raise_alert(
                    "low_throughput",
                    AlertSeverity::Medium,
                    format!("Mean throughput {mean:.2}/s below minimum"),
                    thresholds.min_throughput_per_second,
                    mean,
                )
                .await;
            }
        }

        if let Some(mean) = self.metric_mean(METRIC_CPU, five_min_ago) {
            if mean > thresholds.max_cpu_percent {
                self.raise_alert(
                    "high_cpu_usage",
                    AlertSeverity::High,
                    format!("Mean CPU {mean:.1}% exceeds threshold"),
                    thresholds.max_cpu_percent,
                    mean,
                )
                .await;
            }
        }

        self.purge_resolved_alerts(now).await;
    }

    fn metric_mean(&self, name: &str, cutoff: DateTime<Utc>) -> Option<f64> {
        self.rings
            .get(name)
            .and_then(|ring| windowed_mean(ring.make_contiguous_copy().as_slice(), cutoff))
    }

    /// Raises an alert unless an unresolved one with the same name exists.
    async fn raise_alert(
        &self,
        name: &str,
        severity: AlertSeverity,
        message: String,
        threshold: f64,
        current_value: f64,
    ) {
        let alert = Alert {
            metric_name: name.to_string(),
            severity,
            message,
            threshold,
            current_value,
            timestamp: Utc::now(),
            resolved: false,
        };

        {
            let mut alerts = self.alerts.lock().await;
            if alerts
                .iter()
                .any(|a| a.metric_name == name && !a.resolved)
            {
                return;
            }
            alerts.push(alert.clone());
        }

        warn!(
            alert = name,
            severity = severity.as_str(),
            threshold,
            current_value,
            "{}",
            alert.message
        );
        let handlers = self.handlers.lock().await.clone();
        for handler in handlers {
            if let Err(e) = handler.on_alert(&alert).await {
                warn!(alert = name, error = %e, "Alert handler failed");
            }
        }
    }

    /// Marks every unresolved alert of the given name resolved, re-enabling
    /// future alerts of that name.
    pub async fn resolve_alert(&self, name: &str) -> usize {
        let mut alerts = self.alerts.lock().await;
        let mut resolved = 0;
        for alert in alerts.iter_mut() {
            if alert.metric_name == name && !alert.resolved {
                alert.resolved = true;
                resolved += 1;
            }
        }
        if resolved > 0 {
            info!(alert = name, count = resolved, "Alert resolved");
        }
        resolved
    }

    /// Drops alerts that are both resolved and older than the retention
    /// window. Unresolved alerts are retained indefinitely.
    async fn purge_resolved_alerts(&self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::hours(self.config.alert_retention_hours as i64);
        self.alerts
            .lock()
            .await
            .retain(|a| !a.resolved || a.timestamp >= cutoff);
    }

    /// Unresolved alerts.
    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .await
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    /// Starts the evaluation loop (no-op if already running).
    pub async fn start(self: &Arc<Self>) {
        if self.monitoring_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            monitor.run_monitor_loop(rx).await;
        });
        *self.task.lock().await = Some(handle);

        info!(
            interval_seconds = self.config.check_interval_seconds,
            "Performance monitor loop started"
        );
    }

    /// Stops the evaluation loop and waits for it to finish.
    pub async fn stop(&self) {
        if !self.monitoring_active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }

        info!("Performance monitor loop stopped");
    }

    async fn run_monitor_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.check_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = time::sleep(interval) => {
                    self.evaluate_thresholds().await;
                }
            }
        }
    }

    /// Builds the current performance summary.
    pub async fn get_performance_summary(&self) -> PerformanceSummary {
        let now = Utc::now();
        let minute_ago = now - chrono::Duration::seconds(60);
        let five_min_ago = now - chrono::Duration::seconds(300);

        let response_time = self
            .rings
            .get(METRIC_RESPONSE_TIME)
            .map(|ring| {
                let values: Vec<f64> = ring.iter().map(|p| p.value).collect();
                if values.is_empty() {
                    ResponseTimeSummary::default()
                } else {
                    ResponseTimeSummary {
                        average_ms: values.iter().sum::<f64>() / values.len() as f64,
                        median_ms: percentile(&values, 0.5),
                        p95_ms: percentile(&values, 0.95),
                        max_ms: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    }
                }
            })
            .unwrap_or_default();

        let throughput = self.metric_mean(METRIC_THROUGHPUT, minute_ago).unwrap_or(0.0);

        let total_connections = self
            .rings
            .get(METRIC_CONNECTIONS)
            .and_then(|ring| ring.back().map(|p| p.value as usize))
            .unwrap_or(0);

        let mut by_severity: HashMap<String, usize> = HashMap::new();
        let mut total = 0;
        for alert in self.alerts.lock().await.iter().filter(|a| !a.resolved) {
            *by_severity.entry(alert.severity.as_str().to_string()).or_insert(0) += 1;
            total += 1;
        }

        let mut system_metrics = HashMap::new();
        for name in [METRIC_MEMORY, METRIC_CPU] {
            if let Some(ring) = self.rings.get(name) {
                let values: Vec<f64> = ring
                    .iter()
                    .filter(|p| p.timestamp >= five_min_ago)
                    .map(|p| p.value)
                    .collect();
                system_metrics.insert(name.to_string(), MetricStats::from_values(&values));
            }
        }

        PerformanceSummary {
            timestamp: now,
            response_time,
            throughput_messages_per_second: throughput,
            total_connections,
            active_alerts: ActiveAlerts { total, by_severity },
            system_metrics,
            error_counts: self
                .error_counts
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            monitoring_active: self.monitoring_active.load(Ordering::SeqCst),
        }
    }

    /// Builds a detailed report over a trailing window.
    pub async fn get_detailed_report(&self, window_seconds: u64) -> DetailedReport {
        let cutoff = Utc::now() - chrono::Duration::seconds(window_seconds as i64);

        let mut metrics = HashMap::new();
        for entry in self.rings.iter() {
            let in_window: Vec<MetricPoint> = entry
                .value()
                .iter()
                .filter(|p| p.timestamp >= cutoff)
                .cloned()
                .collect();
            let values: Vec<f64> = in_window.iter().map(|p| p.value).collect();
            let recent_points = if in_window.len() > 100 {
                in_window[in_window.len() - 100..].to_vec()
            } else {
                in_window
            };
            metrics.insert(
                entry.key().clone(),
                MetricReport {
                    stats: MetricStats::from_values(&values),
                    recent_points,
                },
            );
        }

        let alerts = self
            .alerts
            .lock()
            .await
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .cloned()
            .collect();

        DetailedReport {
            window_seconds,
            metrics,
            alerts,
        }
    }

    /// Bundles thresholds, both reports, and the lifetime point count.
    pub async fn export_metrics(&self) -> MetricsExport {
        MetricsExport {
            thresholds: self.config.thresholds.clone(),
            summary: self.get_performance_summary().await,
            detailed: self.get_detailed_report(3600).await,
            total_points_recorded: self.total_points.load(Ordering::Relaxed),
        }
    }

    /// Clears all points, alerts, and counters.
    pub async fn reset(&self) {
        self.rings.clear();
        self.alerts.lock().await.clear();
        self.error_counts.clear();
        self.total_points.store(0, Ordering::Relaxed);
        debug!("Performance monitor reset");
    }
}

/// Copy a ring's points into a contiguous vec for window scans.
trait RingCopy {
    fn make_contiguous_copy(&self) -> Vec<MetricPoint>;
}

impl RingCopy for VecDeque<MetricPoint> {
    fn make_contiguous_copy(&self) -> Vec<MetricPoint> {
        self.iter().cloned().collect()
    }
}
