//! Compressor configuration.

use serde::{Deserialize, Serialize};

/// Payload compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Algorithm name: `"gzip"`, `"zlib"`, `"lz4"`, or `"none"`.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Payloads smaller than this are passed through uncompressed.
    #[serde(default = "default_min_size")]
    pub min_size_bytes: usize,
    /// Backend compression level (gzip/zlib; ignored by lz4).
    #[serde(default = "default_level")]
    pub compression_level: u32,
    /// Reserved flag for adaptive selection; resolution currently always
    /// returns the configured algorithm.
    #[serde(default = "default_true")]
    pub auto_select: bool,
    /// Advisory per-call time budget in milliseconds (not enforced).
    #[serde(default = "default_max_time")]
    pub max_compression_time_ms: u64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            min_size_bytes: default_min_size(),
            compression_level: default_level(),
            auto_select: default_true(),
            max_compression_time_ms: default_max_time(),
        }
    }
}

fn default_algorithm() -> String {
    "gzip".to_string()
}

fn default_min_size() -> usize {
    1024
}

fn default_level() -> u32 {
    6
}

fn default_true() -> bool {
    true
}

fn default_max_time() -> u64 {
    100
}
