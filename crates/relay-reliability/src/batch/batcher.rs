//! Message batcher — accumulates outbound messages per connection and
//! flushes them as a single envelope under configurable bounds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use relay_core::config::BatchConfig;
use relay_core::traits::EnvelopeSink;
use relay_core::types::id::ConnectionId;

use super::types::{Batch, BatchEnvelope, BatchMetrics, BatchStats, BatchedMessage, FlushReason};

/// Accumulates outbound messages per connection, trading latency for
/// throughput without unbounded queuing.
pub struct MessageBatcher {
    /// Configuration.
    config: BatchConfig,
    /// Injected send capability.
    sink: Arc<dyn EnvelopeSink>,
    /// Connection id → open batch. Exactly one open batch per connection.
    batches: DashMap<ConnectionId, Batch>,
    /// Running metrics.
    metrics: Mutex<BatchMetrics>,
    /// Whether the background sweep loop is running.
    running: AtomicBool,
    /// Shutdown signal for the sweep loop.
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    /// Handle of the sweep loop task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MessageBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBatcher")
            .field("config", &self.config)
            .field("open_batches", &self.batches.len())
            .finish()
    }
}

impl MessageBatcher {
    /// Creates a new batcher. The background sweep loop is not started
    /// until [`MessageBatcher::start`] is called.
    pub fn new(config: BatchConfig, sink: Arc<dyn EnvelopeSink>) -> Self {
        Self {
            config,
            sink,
            batches: DashMap::new(),
            metrics: Mutex::new(BatchMetrics::default()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Queues a message on the connection's open batch, flushing first if
    /// the message would not fit and after insertion if any flush
    /// condition is met.
    ///
    /// A message whose own size already exceeds the memory cap is still
    /// accepted alone after a forced flush of the open batch; oversized
    /// messages are never rejected or fragmented here.
    pub async fn add_message(&self, connection_id: &ConnectionId, message: Value, priority: i64) {
        let size_bytes = serde_json::to_vec(&message).map(|v| v.len()).unwrap_or(0);
        let cap_bytes = self.config.max_batch_memory_kb * 1024;

        let needs_preflush = self
            .batches
            .get(connection_id)
            .map(|batch| {
                !batch.is_empty()
                    && (batch.messages.len() + 1 > self.config.max_batch_size
                        || batch.total_size_bytes + size_bytes > cap_bytes)
            })
            .unwrap_or(false);

        if needs_preflush {
            self.flush(connection_id, FlushReason::BatchFull).await;
        }

        // Insert under the shard lock, decide, then release before any
        // await.
        let decision = {
            let mut batch = self
                .batches
                .entry(connection_id.clone())
                .or_insert_with(Batch::new);
            batch.push(BatchedMessage {
                message,
                priority,
                size_bytes,
            });
            self.should_flush(&batch)
        };

        if let Some(reason) = decision {
            self.flush(connection_id, reason).await;
        }
    }

    /// Evaluates flush conditions in fixed order: time, count, bytes,
    /// priority.
    fn should_flush(&self, batch: &Batch) -> Option<FlushReason> {
        if batch.is_empty() {
            return None;
        }
        if batch.age_ms() >= self.config.max_wait_time_ms {
            return Some(FlushReason::TimeLimit);
        }
        if batch.messages.len() >= self.config.max_batch_size {
            return Some(FlushReason::SizeLimit);
        }
        if batch.total_size_bytes >= self.config.max_batch_memory_kb * 1024 {
            return Some(FlushReason::MemoryLimit);
        }
        if self.config.flush_on_high_priority
            && batch.highest_priority >= self.config.priority_threshold
        {
            return Some(FlushReason::HighPriority);
        }
        None
    }

    /// Serializes the connection's open batch and hands it to the send
    /// capability. The batch is discarded and replaced regardless of send
    /// outcome (at-most-once per batch; retry is the caller's concern).
    pub async fn flush(&self, connection_id: &ConnectionId, reason: FlushReason) {
        let taken = {
            match self.batches.get_mut(connection_id) {
                Some(mut entry) => {
                    if entry.is_empty() {
                        None
                    } else {
                        Some(std::mem::replace(&mut *entry, Batch::new()))
                    }
                }
                None => None,
            }
        };

        let Some(batch) = taken else {
            return;
        };

        let wait_ms = batch.age_ms();
        let envelope = BatchEnvelope::from_batch(&batch);
        let count = envelope.count;
        let bytes = envelope.total_size_bytes;

        match serde_json::to_value(&envelope) {
            Ok(payload) => {
                if let Err(e) = self.sink.send(connection_id, payload).await {
                    warn!(
                        conn_id = %connection_id,
                        reason = reason.as_str(),
                        error = %e,
                        "Batch send failed, batch discarded"
                    );
                } else {
                    debug!(
                        conn_id = %connection_id,
                        reason = reason.as_str(),
                        count,
                        bytes,
                        "Batch flushed"
                    );
                }
            }
            Err(e) => {
                warn!(conn_id = %connection_id, error = %e, "Batch envelope serialization failed");
            }
        }

        let mut metrics = self.metrics.lock().await;
        metrics.total_batches_sent += 1;
        metrics.total_messages_batched += count as u64;
        metrics.total_bytes_sent += bytes as u64;
        let n = metrics.total_batches_sent as f64;
        metrics.average_batch_size += (count as f64 - metrics.average_batch_size) / n;
        metrics.average_wait_time_ms += (wait_ms as f64 - metrics.average_wait_time_ms) / n;
        match reason {
            FlushReason::TimeLimit => metrics.time_based_flushes += 1,
            FlushReason::SizeLimit | FlushReason::MemoryLimit | FlushReason::BatchFull => {
                metrics.size_based_flushes += 1;
            }
            FlushReason::HighPriority | FlushReason::Forced | FlushReason::Shutdown => {
                metrics.forced_flushes += 1;
            }
        }
    }

    /// Force-flushes one connection's batch now; no-op if none or empty.
    pub async fn flush_connection(&self, connection_id: &ConnectionId) {
        self.flush(connection_id, FlushReason::Forced).await;
    }

    /// Starts the background sweep loop that flushes idle aged batches.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let batcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            batcher.run_sweep_loop(rx).await;
        });
        *self.task.lock().await = Some(handle);

        info!(
            sweep_interval_ms = self.config.sweep_interval_ms,
            "Batch sweep loop started"
        );
    }

    /// Stops the sweep loop if it is running, then flushes every remaining
    /// non-empty batch with reason "shutdown" before returning. The final
    /// flush happens whether or not the loop was ever started; no message
    /// is silently dropped. The flush has no bounded timeout on the sink.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(tx) = self.shutdown.lock().await.take() {
                let _ = tx.send(true);
            }
            if let Some(handle) = self.task.lock().await.take() {
                let _ = handle.await;
            }
            info!("Batch sweep loop stopped");
        }

        let pending: Vec<ConnectionId> = self
            .batches
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();

        if !pending.is_empty() {
            info!(count = pending.len(), "Flushing pending batches on shutdown");
        }
        for id in pending {
            self.flush(&id, FlushReason::Shutdown).await;
        }
    }

    /// Periodic sweep: flushes open batches whose conditions fire without
    /// anyone actively appending to them.
    async fn run_sweep_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_millis(self.config.sweep_interval_ms);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = time::sleep(interval) => {
                    let due: Vec<(ConnectionId, FlushReason)> = self
                        .batches
                        .iter()
                        .filter_map(|entry| {
                            self.should_flush(entry.value())
                                .map(|reason| (entry.key().clone(), reason))
                        })
                        .collect();

                    for (id, reason) in due {
                        self.flush(&id, reason).await;
                    }
                }
            }
        }
    }

    /// Running metrics snapshot.
    pub async fn get_metrics(&self) -> BatchMetrics {
        self.metrics.lock().await.clone()
    }

    /// Builds the full batcher stats report.
    pub async fn get_batch_stats(&self) -> BatchStats {
        let mut connections_with_batches = Vec::new();
        let mut total_pending_messages = 0;
        for entry in self.batches.iter() {
            if !entry.value().is_empty() {
                connections_with_batches.push(entry.key().to_string());
                total_pending_messages += entry.value().messages.len();
            }
        }

        BatchStats {
            config: self.config.clone(),
            metrics: self.metrics.lock().await.clone(),
            active_batches: connections_with_batches.len(),
            total_pending_messages,
            connections_with_batches,
            running: self.running.load(Ordering::SeqCst),
        }
    }
}
