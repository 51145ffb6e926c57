//! Compression statistics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use relay_core::config::CompressionConfig;

/// Accumulated compressor counters.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatsInner {
    pub total_messages: u64,
    pub compressed_messages: u64,
    pub total_bytes_original: u64,
    pub total_bytes_after: u64,
    pub total_compression_time_ms: f64,
    pub algorithm_usage: HashMap<String, u64>,
}

/// Full compression stats report.
///
/// Field names are load-bearing for dashboards and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Messages passed through compress_message.
    pub total_messages: u64,
    /// Messages that actually got the compressed envelope.
    pub compressed_messages: u64,
    /// compressed_messages / total_messages.
    pub compression_rate: f64,
    /// Sum of input sizes.
    pub total_bytes_original: u64,
    /// Sum of output payload sizes (compressed or passed through).
    pub total_bytes_after_compression: u64,
    /// total_bytes_original - total_bytes_after_compression.
    pub bytes_saved: u64,
    /// total_bytes_after_compression / total_bytes_original.
    pub overall_compression_ratio: f64,
    /// Mean time spent compressing, per compressed message.
    pub average_compression_time_ms: f64,
    /// Compressed-message counts per algorithm.
    pub algorithm_usage: HashMap<String, u64>,
    /// Active configuration.
    pub config: CompressionConfig,
}

impl StatsInner {
    pub fn report(&self, config: &CompressionConfig) -> CompressionStats {
        let compression_rate = if self.total_messages > 0 {
            self.compressed_messages as f64 / self.total_messages as f64
        } else {
            0.0
        };
        let overall_compression_ratio = if self.total_bytes_original > 0 {
            self.total_bytes_after as f64 / self.total_bytes_original as f64
        } else {
            1.0
        };
        let average_compression_time_ms = if self.compressed_messages > 0 {
            self.total_compression_time_ms / self.compressed_messages as f64
        } else {
            0.0
        };

        CompressionStats {
            total_messages: self.total_messages,
            compressed_messages: self.compressed_messages,
            compression_rate,
            total_bytes_original: self.total_bytes_original,
            total_bytes_after_compression: self.total_bytes_after,
            bytes_saved: self
                .total_bytes_original
                .saturating_sub(self.total_bytes_after),
            overall_compression_ratio,
            average_compression_time_ms,
            algorithm_usage: self.algorithm_usage.clone(),
            config: config.clone(),
        }
    }
}
