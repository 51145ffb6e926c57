//! Batch, envelope, and metric types for the message batcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use relay_core::config::BatchConfig;

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Batch age reached max_wait_time_ms.
    TimeLimit,
    /// Message count reached max_batch_size.
    SizeLimit,
    /// Payload bytes reached max_batch_memory_kb.
    MemoryLimit,
    /// A message at or above priority_threshold was seen.
    HighPriority,
    /// An incoming message would not fit; the open batch was flushed to
    /// make room.
    BatchFull,
    /// Explicit flush_connection call.
    Forced,
    /// Final flush during stop().
    Shutdown,
}

impl FlushReason {
    /// Wire string for logs and tests.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeLimit => "time_limit",
            Self::SizeLimit => "size_limit",
            Self::MemoryLimit => "memory_limit",
            Self::HighPriority => "high_priority",
            Self::BatchFull => "batch_full",
            Self::Forced => "forced",
            Self::Shutdown => "shutdown",
        }
    }
}

/// One queued message inside an open batch.
#[derive(Debug, Clone)]
pub(crate) struct BatchedMessage {
    pub message: Value,
    pub priority: i64,
    pub size_bytes: usize,
}

/// An open per-connection batch. At most one exists per connection; it is
/// replaced by a fresh empty one on flush.
#[derive(Debug)]
pub(crate) struct Batch {
    pub messages: Vec<BatchedMessage>,
    pub total_size_bytes: usize,
    pub highest_priority: i64,
    pub created_at: DateTime<Utc>,
    pub opened: Instant,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            total_size_bytes: 0,
            highest_priority: 0,
            created_at: Utc::now(),
            opened: Instant::now(),
        }
    }

    pub fn push(&mut self, message: BatchedMessage) {
        self.total_size_bytes += message.size_bytes;
        self.highest_priority = self.highest_priority.max(message.priority);
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn age_ms(&self) -> u64 {
        self.opened.elapsed().as_millis() as u64
    }
}

/// Serialized wire envelope for a flushed batch.
///
/// Field names are load-bearing for dashboards and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEnvelope {
    /// Always "batch".
    #[serde(rename = "type")]
    pub kind: String,
    /// Number of messages in the envelope.
    pub count: usize,
    /// The messages, in insertion order.
    pub messages: Vec<Value>,
    /// Total payload size in bytes.
    pub total_size_bytes: usize,
    /// Highest priority seen in the batch.
    pub highest_priority: i64,
    /// When the batch was opened, ISO-8601.
    pub created_at: String,
}

impl BatchEnvelope {
    pub(crate) fn from_batch(batch: &Batch) -> Self {
        Self {
            kind: "batch".to_string(),
            count: batch.messages.len(),
            messages: batch.messages.iter().map(|m| m.message.clone()).collect(),
            total_size_bytes: batch.total_size_bytes,
            highest_priority: batch.highest_priority,
            created_at: batch.created_at.to_rfc3339(),
        }
    }
}

/// Running batcher metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchMetrics {
    /// Batches handed to the send capability.
    pub total_batches_sent: u64,
    /// Messages that passed through batches.
    pub total_messages_batched: u64,
    /// Running average messages per flushed batch.
    pub average_batch_size: f64,
    /// Running average batch age at flush, in milliseconds.
    pub average_wait_time_ms: f64,
    /// Total envelope payload bytes sent.
    pub total_bytes_sent: u64,
    /// Flushes caused by explicit requests, shutdown, or high priority.
    pub forced_flushes: u64,
    /// Flushes caused by batch age.
    pub time_based_flushes: u64,
    /// Flushes caused by count, memory, or batch_full pre-flushes.
    pub size_based_flushes: u64,
}

/// Full batcher stats report.
///
/// Field names are load-bearing for dashboards and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStats {
    /// Active configuration.
    pub config: BatchConfig,
    /// Running metrics.
    pub metrics: BatchMetrics,
    /// Open non-empty batches.
    pub active_batches: usize,
    /// Messages waiting in open batches.
    pub total_pending_messages: usize,
    /// Connection ids with an open non-empty batch.
    pub connections_with_batches: Vec<String>,
    /// Whether the background sweep loop is running.
    pub running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flush_reason_strings() {
        assert_eq!(FlushReason::TimeLimit.as_str(), "time_limit");
        assert_eq!(FlushReason::BatchFull.as_str(), "batch_full");
        assert_eq!(FlushReason::Shutdown.as_str(), "shutdown");
    }

    #[tokio::test]
    async fn test_envelope_preserves_order_and_fields() {
        let mut batch = Batch::new();
        for i in 0..3 {
            batch.push(BatchedMessage {
                message: json!({"seq": i}),
                priority: i,
                size_bytes: 10,
            });
        }

        let envelope = BatchEnvelope::from_batch(&batch);
        assert_eq!(envelope.kind, "batch");
        assert_eq!(envelope.count, 3);
        assert_eq!(envelope.total_size_bytes, 30);
        assert_eq!(envelope.highest_priority, 2);
        for (i, msg) in envelope.messages.iter().enumerate() {
            assert_eq!(msg["seq"], i);
        }

        let wire = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(wire["type"], "batch");
        assert!(wire["created_at"].is_string());
    }
}
