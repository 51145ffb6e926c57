//! Reconnection configuration.

use serde::{Deserialize, Serialize};

/// Exponential-backoff reconnection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether automatic reconnection is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum reconnection attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Upper bound on the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Exponential growth factor applied per attempt.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Uniform jitter band as a fraction of the computed delay.
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
    /// Milliseconds a connection must stay up before prior failures are
    /// forgiven and the backoff baseline returns to initial_delay_ms.
    #[serde(default = "default_reset_delay")]
    pub reset_delay_after_success_ms: u64,
    /// Disconnect reasons for which retrying is never attempted.
    #[serde(default = "default_permanent_reasons")]
    pub permanent_failure_reasons: Vec<String>,
}

impl ReconnectConfig {
    /// Whether a disconnect reason is in the permanent-failure set.
    pub fn is_permanent_failure(&self, reason: &str) -> bool {
        self.permanent_failure_reasons.iter().any(|r| r == reason)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_multiplier(),
            jitter_factor: default_jitter(),
            reset_delay_after_success_ms: default_reset_delay(),
            permanent_failure_reasons: default_permanent_reasons(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_reset_delay() -> u64 {
    60_000
}

fn default_permanent_reasons() -> Vec<String> {
    vec![
        "auth_failed".to_string(),
        "forbidden".to_string(),
        "rate_limited".to_string(),
    ]
}
