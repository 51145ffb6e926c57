//! Per-connection memory bounding and health reporting.

pub mod manager;
pub mod metrics;

pub use manager::MemoryManager;
pub use metrics::{CleanupReport, MemoryHealth, MemoryIssue, MemoryMetrics, MemoryStats};
