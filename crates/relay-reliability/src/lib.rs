//! # relay-reliability
//!
//! Reliability and performance layer beneath the AgentRelay real-time
//! WebSocket channel. Provides:
//!
//! - Per-connection message batching with multi-condition flush triggers
//! - Transparent payload compression (gzip/zlib/lz4) with safe fallbacks
//! - Bounded per-connection memory tracking with background cleanup
//! - Threshold-debounced performance alerting and reporting
//! - Exponential-backoff reconnection with jitter and a global registry
//! - Transport/internal state drift detection
//!
//! The components are independent subsystems composed by the
//! transport-facing caller; they never call each other directly.

pub mod batch;
pub mod compress;
pub mod memory;
pub mod perf;
pub mod reconnect;
pub mod sync;

pub use batch::MessageBatcher;
pub use compress::Compressor;
pub use memory::MemoryManager;
pub use perf::PerformanceMonitor;
pub use reconnect::{GlobalReconnectionManager, ReconnectionManager};
pub use sync::StateSynchronizer;
