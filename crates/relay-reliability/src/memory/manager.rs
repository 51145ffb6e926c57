//! Memory manager — bounds per-connection message buffers and reports on
//! memory health.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use relay_core::config::MemoryConfig;
use relay_core::types::id::ConnectionId;
use relay_core::RelayResult;

use super::metrics::{
    BufferLimits, CleanupReport, ConnectionBufferDetail, MemoryHealth, MemoryIssue, MemoryMetrics,
    MemoryStats,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One tracked message: size and age only, the payload itself is not
/// retained here.
#[derive(Debug, Clone, Copy)]
struct TrackedMessage {
    size_bytes: usize,
}

/// Ordered per-connection buffer with a cached byte total.
///
/// Invariant: `len() <= max_messages_per_connection`, and `total_bytes`
/// stays within bounded drift of the true sum (recomputed exactly on bulk
/// eviction).
#[derive(Debug, Default)]
struct ConnectionBuffer {
    messages: VecDeque<TrackedMessage>,
    total_bytes: usize,
}

/// Tracks per-connection buffer memory and runs the periodic cleanup loop.
#[derive(Debug)]
pub struct MemoryManager {
    /// Configuration.
    config: MemoryConfig,
    /// Connection id → tracked buffer.
    buffers: DashMap<ConnectionId, ConnectionBuffer>,
    /// Ordered snapshot history, purged past the retention window.
    history: Mutex<Vec<MemoryMetrics>>,
    /// Messages tracked since startup.
    total_allocations: AtomicU64,
    /// Cleanup passes completed since startup.
    cleanup_passes: AtomicU64,
    /// Whether the background loop is running.
    monitoring_active: AtomicBool,
    /// Shutdown signal for the background loop.
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    /// Handle of the background loop task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryManager {
    /// Creates a new memory manager. The background loop is not started
    /// until [`MemoryManager::start`] is called.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            buffers: DashMap::new(),
            history: Mutex::new(Vec::new()),
            total_allocations: AtomicU64::new(0),
            cleanup_passes: AtomicU64::new(0),
            monitoring_active: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Registers a connection, creating an empty buffer for it.
    pub fn register_connection(&self, connection_id: &ConnectionId) {
        self.buffers
            .entry(connection_id.clone())
            .or_insert_with(ConnectionBuffer::default);
        debug!(conn_id = %connection_id, "Connection buffer registered");
    }

    /// Unregisters a connection and drops its buffer. Safe to call for an
    /// unknown id.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        if self.buffers.remove(connection_id).is_some() {
            debug!(conn_id = %connection_id, "Connection buffer unregistered");
        }
    }

    /// Tracks one message against a connection's buffer.
    ///
    /// Returns `false` (no-op) if the connection is not registered.
    /// Evicts oldest-first when the message count cap is exceeded; drops
    /// the older half and recomputes the cached size exactly when the
    /// byte cap is exceeded.
    pub fn track_message(&self, connection_id: &ConnectionId, message: &Value) -> bool {
        let size_bytes = estimate_size(message);

        let Some(mut buffer) = self.buffers.get_mut(connection_id) else {
            return false;
        };

        buffer.messages.push_back(TrackedMessage { size_bytes });
        buffer.total_bytes += size_bytes;
        self.total_allocations.fetch_add(1, Ordering::Relaxed);

        if buffer.messages.len() > self.config.max_messages_per_connection {
            if let Some(evicted) = buffer.messages.pop_front() {
                buffer.total_bytes = buffer.total_bytes.saturating_sub(evicted.size_bytes);
            }
        }

        let byte_limit = (self.config.max_buffer_size_mb * BYTES_PER_MB) as usize;
        if buffer.total_bytes > byte_limit {
            let keep_from = buffer.messages.len() / 2;
            buffer.messages.drain(..keep_from);
            // Incremental accounting is not trusted after a bulk eviction.
            buffer.total_bytes = buffer.messages.iter().map(|m| m.size_bytes).sum();
            debug!(
                conn_id = %connection_id,
                remaining = buffer.messages.len(),
                "Buffer over byte limit, dropped older half"
            );
        }

        true
    }

    /// Purges expired metric snapshots and unregisters connections whose
    /// cached size exceeds the byte limit.
    pub async fn force_cleanup(&self) -> CleanupReport {
        let started = Instant::now();

        let cutoff = Utc::now() - chrono::Duration::hours(self.config.metrics_retention_hours as i64);
        let cleaned_metrics = {
            let mut history = self.history.lock().await;
            let before = history.len();
            history.retain(|m| m.timestamp >= cutoff);
            before - history.len()
        };

        let byte_limit = (self.config.max_buffer_size_mb * BYTES_PER_MB) as usize;
        let stale: Vec<(ConnectionId, usize)> = self
            .buffers
            .iter()
            .filter(|entry| entry.value().total_bytes > byte_limit)
            .map(|entry| (entry.key().clone(), entry.value().total_bytes))
            .collect();

        let mut freed_bytes = 0usize;
        for (id, bytes) in &stale {
            self.buffers.remove(id);
            freed_bytes += bytes;
            warn!(conn_id = %id, bytes, "Stale over-limit connection buffer removed");
        }

        self.cleanup_passes.fetch_add(1, Ordering::Relaxed);

        let cleanup_time_seconds = started.elapsed().as_secs_f64();
        if cleanup_time_seconds > 1.0 {
            warn!(
                seconds = cleanup_time_seconds,
                "Memory cleanup pass exceeded its time budget"
            );
        }

        CleanupReport {
            cleaned_connections: stale.len(),
            cleaned_metrics,
            freed_memory_mb: freed_bytes as f64 / BYTES_PER_MB,
            cleanup_time_seconds,
        }
    }

    /// Collects a snapshot and appends it to the history.
    pub async fn collect_metrics(&self) -> MemoryMetrics {
        let connection_bytes: usize = self.buffers.iter().map(|e| e.value().total_bytes).sum();

        let metrics = MemoryMetrics {
            total_memory_mb: process_memory_bytes() as f64 / BYTES_PER_MB,
            connection_memory_mb: connection_bytes as f64 / BYTES_PER_MB,
            active_connections: self.buffers.len(),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            gc_collections: self.cleanup_passes.load(Ordering::Relaxed),
            timestamp: Utc::now(),
        };

        self.history.lock().await.push(metrics.clone());
        metrics
    }

    /// Evaluates health rules against the latest snapshot.
    pub async fn check_memory_health(&self) -> MemoryHealth {
        let history = self.history.lock().await;
        let mut issues = Vec::new();

        if let Some(latest) = history.last() {
            if latest.connection_memory_mb > self.config.high_memory_threshold_mb {
                issues.push(MemoryIssue {
                    issue: "high_memory_usage".to_string(),
                    severity: "high".to_string(),
                    current_value: latest.connection_memory_mb,
                    threshold: self.config.high_memory_threshold_mb,
                });
            }

            if latest.active_connections > self.config.high_connection_threshold {
                issues.push(MemoryIssue {
                    issue: "high_connection_count".to_string(),
                    severity: "medium".to_string(),
                    current_value: latest.active_connections as f64,
                    threshold: self.config.high_connection_threshold as f64,
                });
            }

            if history.len() >= 2 {
                let previous = &history[history.len() - 2];
                if previous.connection_memory_mb > 0.0 {
                    let growth = (latest.connection_memory_mb - previous.connection_memory_mb)
                        / previous.connection_memory_mb;
                    if growth > self.config.growth_rate_threshold {
                        issues.push(MemoryIssue {
                            issue: "memory_growth".to_string(),
                            severity: "medium".to_string(),
                            current_value: growth,
                            threshold: self.config.growth_rate_threshold,
                        });
                    }
                }
            }
        }

        MemoryHealth {
            status: if issues.is_empty() {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            issues,
        }
    }

    /// Builds the full memory stats report.
    pub async fn get_memory_stats(&self) -> MemoryStats {
        let connection_details: HashMap<String, ConnectionBufferDetail> = self
            .buffers
            .iter()
            .map(|entry| {
                (
                    entry.key().to_string(),
                    ConnectionBufferDetail {
                        message_count: entry.value().messages.len(),
                        buffer_size_mb: entry.value().total_bytes as f64 / BYTES_PER_MB,
                    },
                )
            })
            .collect();

        let history = self.history.lock().await;

        MemoryStats {
            current_metrics: history.last().cloned(),
            connection_details,
            buffer_limits: BufferLimits {
                max_messages_per_connection: self.config.max_messages_per_connection,
                max_buffer_size_mb: self.config.max_buffer_size_mb,
            },
            metrics_history_count: history.len(),
            monitoring_active: self.monitoring_active.load(Ordering::SeqCst),
        }
    }

    /// Starts the background cleanup loop (no-op if already running).
    pub async fn start(self: &Arc<Self>) {
        if self.monitoring_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.run_cleanup_loop(rx).await;
        });
        *self.task.lock().await = Some(handle);

        info!(
            interval_seconds = self.config.cleanup_interval_seconds,
            "Memory cleanup loop started"
        );
    }

    /// Stops the background loop and waits for it to finish.
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

        info!("Memory cleanup loop stopped");
    }

    /// Periodic cleanup loop: force_cleanup, snapshot, then sleep. The
    /// first tick runs immediately so a fresh manager has a baseline
    /// snapshot before the first full interval elapses. Errors are logged
    /// and retried after a short cooldown, never fatal.
    async fn run_cleanup_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.cleanup_interval_seconds);
        let retry = Duration::from_secs(self.config.error_retry_seconds);

        loop {
            let delay = match self.cleanup_tick().await {
                Ok(()) => interval,
                Err(e) => {
                    warn!(error = %e, "Memory cleanup tick failed, retrying after cooldown");
                    retry
                }
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = time::sleep(delay) => {}
            }
        }
    }

    async fn cleanup_tick(&self) -> RelayResult<()> {
        let report = self.force_cleanup().await;
        let metrics = self.collect_metrics().await;
        debug!(
            cleaned_connections = report.cleaned_connections,
            cleaned_metrics = report.cleaned_metrics,
            connection_memory_mb = metrics.connection_memory_mb,
            active_connections = metrics.active_connections,
            "Memory cleanup tick complete"
        );
        Ok(())
    }

    /// Tracked message count for one connection (None if unregistered).
    pub fn buffer_len(&self, connection_id: &ConnectionId) -> Option<usize> {
        self.buffers.get(connection_id).map(|b| b.messages.len())
    }

    /// Cached buffer size in bytes for one connection.
    pub fn buffer_bytes(&self, connection_id: &ConnectionId) -> Option<usize> {
        self.buffers.get(connection_id).map(|b| b.total_bytes)
    }
}

/// Estimated wire size of a message: compact JSON length.
fn estimate_size(message: &Value) -> usize {
    serde_json::to_vec(message).map(|v| v.len()).unwrap_or(0)
}

/// Current process resident memory in bytes (0 if the pid cannot be
/// resolved).
fn process_memory_bytes() -> u64 {
    let mut system = sysinfo::System::new();
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let _ = system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), false);
    system.process(pid).map_or(0, sysinfo::Process::memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_config() -> MemoryConfig {
        MemoryConfig {
            max_messages_per_connection: 5,
            max_buffer_size_mb: 10.0,
            ..MemoryConfig::default()
        }
    }

    #[test]
    fn test_track_unregistered_is_noop() {
        let manager = MemoryManager::new(MemoryConfig::default());
        let id = ConnectionId::from("ghost");
        assert!(!manager.track_message(&id, &json!({"a": 1})));
        assert!(manager.buffer_len(&id).is_none());
    }

    #[test]
    fn test_buffer_never_exceeds_message_cap() {
        let manager = MemoryManager::new(small_config());
        let id = ConnectionId::from("c1");
        manager.register_connection(&id);

        for i in 0..25 {
            assert!(manager.track_message(&id, &json!({"seq": i})));
            assert!(manager.buffer_len(&id).expect("registered") <= 5);
        }
        assert_eq!(manager.buffer_len(&id), Some(5));
    }

    #[test]
    fn test_byte_overflow_drops_older_half_and_recomputes() {
        let config = MemoryConfig {
            max_messages_per_connection: 100,
            // ~1 KB cap so a handful of messages overflow it
            max_buffer_size_mb: 0.001,
            ..MemoryConfig::default()
        };
        let manager = MemoryManager::new(config);
        let id = ConnectionId::from("c1");
        manager.register_connection(&id);

        let payload = json!({"data": "x".repeat(400)});
        for _ in 0..4 {
            manager.track_message(&id, &payload);
        }

        let len = manager.buffer_len(&id).expect("registered");
        let bytes = manager.buffer_bytes(&id).expect("registered");
        assert!(len < 4, "older half should have been dropped, len={len}");
        let expected: usize = estimate_size(&payload) * len;
        assert_eq!(bytes, expected, "cached size must be recomputed exactly");
    }

    #[test]
    fn test_unregister_unknown_is_safe() {
        let manager = MemoryManager::new(MemoryConfig::default());
        manager.unregister_connection(&ConnectionId::from("never-seen"));
    }

    #[tokio::test]
    async fn test_force_cleanup_removes_over_limit_buffers() {
        let config = MemoryConfig {
            max_messages_per_connection: 1_000_000,
            max_buffer_size_mb: 0.0005,
            ..MemoryConfig::default()
        };
        // Cap high enough that track_message's own halving keeps a
        // non-empty over-limit buffer for cleanup to find.
        let manager = MemoryManager::new(config);
        let id = ConnectionId::from("bloated");
        manager.register_connection(&id);
        // One message larger than the cap: halving a single-element
        // buffer keeps it, so it stays over limit.
        manager.track_message(&id, &json!({"data": "y".repeat(2000)}));

        let report = manager.force_cleanup().await;
        assert_eq!(report.cleaned_connections, 1);
        assert!(report.freed_memory_mb > 0.0);
        assert!(manager.buffer_len(&id).is_none());
    }

    #[tokio::test]
    async fn test_health_rules() {
        let config = MemoryConfig {
            high_memory_threshold_mb: 0.0001,
            ..MemoryConfig::default()
        };
        let manager = MemoryManager::new(config);
        let id = ConnectionId::from("c1");
        manager.register_connection(&id);
        manager.track_message(&id, &json!({"data": "z".repeat(500)}));

        manager.collect_metrics().await;
        let health = manager.check_memory_health().await;
        assert_eq!(health.status, "degraded");
        assert!(health.issues.iter().any(|i| i.issue == "high_memory_usage"));
    }

    #[tokio::test]
    async fn test_healthy_when_empty() {
        let manager = MemoryManager::new(MemoryConfig::default());
        manager.collect_metrics().await;
        let health = manager.check_memory_health().await;
        assert_eq!(health.status, "healthy");
        assert!(health.issues.is_empty());
    }

    #[tokio::test]
    async fn test_stats_report_shape() {
        let manager = MemoryManager::new(MemoryConfig::default());
        let id = ConnectionId::from("c1");
        manager.register_connection(&id);
        manager.track_message(&id, &json!({"k": "v"}));
        manager.collect_metrics().await;

        let stats = manager.get_memory_stats().await;
        assert_eq!(stats.metrics_history_count, 1);
        assert!(!stats.monitoring_active);
        assert_eq!(stats.connection_details["c1"].message_count, 1);
        assert_eq!(stats.buffer_limits.max_messages_per_connection, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_snapshots_immediately_on_start() {
        let manager = Arc::new(MemoryManager::new(MemoryConfig::default()));
        manager.start().await;

        // The first tick runs before the first 300s interval sleep.
        time::sleep(Duration::from_millis(10)).await;
        let stats = manager.get_memory_stats().await;
        assert!(
            stats.metrics_history_count >= 1,
            "first snapshot must not wait a full interval"
        );
        assert!(stats.current_metrics.is_some());

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_start_stop_is_clean() {
        let manager = Arc::new(MemoryManager::new(MemoryConfig::default()));
        manager.start().await;
        assert!(manager.get_memory_stats().await.monitoring_active);
        manager.stop().await;
        assert!(!manager.get_memory_stats().await.monitoring_active);
    }
}
