//! Per-connection outbound message batching.

pub mod batcher;
pub mod types;

pub use batcher::MessageBatcher;
pub use types::{BatchEnvelope, BatchMetrics, BatchStats, FlushReason};
