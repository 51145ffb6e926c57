//! Reliability-layer configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section; every field has a serde default so the whole tree can be
//! constructed with `Default` when no file is present.

pub mod batch;
pub mod compression;
pub mod logging;
pub mod memory;
pub mod monitor;
pub mod reconnect;
pub mod sync;

use serde::{Deserialize, Serialize};

pub use self::batch::BatchConfig;
pub use self::compression::CompressionConfig;
pub use self::logging::LoggingConfig;
pub use self::memory::MemoryConfig;
pub use self::monitor::{MonitorConfig, MonitorThresholds};
pub use self::reconnect::ReconnectConfig;
pub use self::sync::SyncConfig;

use crate::error::RelayError;

/// Root reliability-layer configuration.
///
/// Top-level deserialization target for the merged TOML configuration
/// files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Memory manager settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Message batcher settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Compressor settings.
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Performance monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Reconnection settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Connection state synchronizer settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific
    /// overlay and environment variables prefixed with `RELAY__`.
    pub fn load(env: &str) -> Result<Self, RelayError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RelayError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| RelayError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tree_matches_documented_defaults() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.memory.max_messages_per_connection, 1000);
        assert_eq!(cfg.batch.max_batch_size, 50);
        assert_eq!(cfg.compression.min_size_bytes, 1024);
        assert_eq!(cfg.monitor.check_interval_seconds, 5);
        assert_eq!(cfg.reconnect.max_attempts, 10);
        assert_eq!(cfg.sync.desync_threshold_seconds, 30);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: RelayConfig = serde_json::from_str(r#"{"batch":{"max_batch_size":3}}"#)
            .expect("deserialize partial config");
        assert_eq!(cfg.batch.max_batch_size, 3);
        assert_eq!(cfg.batch.max_wait_time_ms, 100);
        assert_eq!(cfg.memory.max_buffer_size_mb, 10.0);
    }
}
