//! Integration tests for the outbound batching and compression path.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use relay_core::config::{BatchConfig, CompressionConfig, MemoryConfig};
use relay_core::traits::sink::EnvelopeSink;
use relay_core::types::id::ConnectionId;
use relay_core::RelayResult;
use relay_reliability::batch::MessageBatcher;
use relay_reliability::compress::Compressor;
use relay_reliability::memory::MemoryManager;

struct RecordingSink {
    envelopes: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            envelopes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EnvelopeSink for RecordingSink {
    async fn send(&self, connection_id: &ConnectionId, envelope: Value) -> RelayResult<()> {
        self.envelopes
            .lock()
            .unwrap()
            .push((connection_id.to_string(), envelope));
        Ok(())
    }
}

#[tokio::test]
async fn test_batched_envelope_survives_compression_round_trip() {
    let sink = RecordingSink::new();
    let batcher = MessageBatcher::new(
        BatchConfig {
            max_batch_size: 3,
            max_wait_time_ms: 100_000,
            max_batch_memory_kb: 1000,
            ..BatchConfig::default()
        },
        sink.clone(),
    );
    let compressor = Compressor::new(CompressionConfig {
        min_size_bytes: 64,
        ..CompressionConfig::default()
    });
    let connection = ConnectionId::from("agent-42");

    // Large repetitive payloads so the batch envelope compresses well.
    for i in 0..3 {
        let message = json!({
            "type": "agent_output",
            "sequence": i,
            "body": "status update ".repeat(50),
        });
        batcher.add_message(&connection, message, 0).await;
    }

    let envelopes = sink.envelopes.lock().unwrap().clone();
    assert_eq!(envelopes.len(), 1);
    let (target, envelope) = &envelopes[0];
    assert_eq!(target, "agent-42");
    assert_eq!(envelope["type"], "batch");
    assert_eq!(envelope["count"], 3);

    let (wire, result) = compressor.compress_message(envelope);
    assert!(result.is_compressed);
    assert!(result.compressed_size < result.original_size);

    let restored = compressor.decompress_message(&wire).expect("decompress");
    assert_eq!(&restored, envelope);
    assert_eq!(restored["messages"][0]["sequence"], 0);
    assert_eq!(restored["messages"][2]["sequence"], 2);
}

#[tokio::test]
async fn test_shutdown_flushes_every_pending_batch() {
    let sink = RecordingSink::new();
    let batcher = Arc::new(MessageBatcher::new(
        BatchConfig {
            max_batch_size: 50,
            max_wait_time_ms: 100_000,
            ..BatchConfig::default()
        },
        sink.clone(),
    ));
    batcher.start().await;

    for conn in ["c1", "c2", "c3"] {
        let id = ConnectionId::from(conn);
        batcher.add_message(&id, json!({"seq": 1}), 0).await;
        batcher.add_message(&id, json!({"seq": 2}), 0).await;
    }
    assert!(sink.envelopes.lock().unwrap().is_empty());

    batcher.stop().await;

    let envelopes = sink.envelopes.lock().unwrap().clone();
    assert_eq!(envelopes.len(), 3);
    for (_, envelope) in &envelopes {
        assert_eq!(envelope["count"], 2);
    }

    let metrics = batcher.get_metrics().await;
    assert_eq!(metrics.total_messages_batched, 6);
    assert_eq!(metrics.forced_flushes, 3);
}

#[tokio::test]
async fn test_memory_manager_tracks_the_same_traffic() {
    let manager = MemoryManager::new(MemoryConfig {
        max_messages_per_connection: 100,
        ..MemoryConfig::default()
    });
    let connection = ConnectionId::from("agent-42");

    assert!(!manager.track_message(&connection, &json!({"seq": 0})));

    manager.register_connection(&connection);
    for i in 0..10 {
        assert!(manager.track_message(&connection, &json!({"seq": i})));
    }

    manager.collect_metrics().await;
    let stats = manager.get_memory_stats().await;
    let current = stats.current_metrics.expect("snapshot after collect");
    assert_eq!(current.active_connections, 1);
    assert_eq!(stats.metrics_history_count, 1);
    assert_eq!(manager.buffer_len(&connection), Some(10));

    manager.unregister_connection(&connection);
    assert_eq!(manager.buffer_len(&connection), None);
}
