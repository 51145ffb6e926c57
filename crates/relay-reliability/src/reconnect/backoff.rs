//! Backoff delay computation.

use std::time::Duration;

use rand::Rng;

use relay_core::config::ReconnectConfig;

/// Next backoff baseline after an attempt: multiplied, capped at
/// max_delay_ms.
pub fn advance_baseline(baseline_ms: f64, config: &ReconnectConfig) -> f64 {
    (baseline_ms * config.backoff_multiplier).min(config.max_delay_ms as f64)
}

/// Apply uniform jitter of `jitter_factor × base_ms` around the base
/// delay, floored at zero.
pub fn apply_jitter(base_ms: f64, jitter_factor: f64) -> Duration {
    let band = jitter_factor * base_ms;
    let jitter = if band > 0.0 {
        rand::thread_rng().gen_range(-band..=band)
    } else {
        0.0
    };
    Duration::from_millis((base_ms + jitter).max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            ..ReconnectConfig::default()
        }
    }

    /// Pre-jitter delays consumed over a run, as the manager derives
    /// them: use the baseline, then advance it.
    fn delay_sequence(attempts: u32, cfg: &ReconnectConfig) -> Vec<f64> {
        let mut baseline = cfg.initial_delay_ms as f64;
        (0..attempts)
            .map(|_| {
                let delay = baseline;
                baseline = advance_baseline(baseline, cfg);
                delay
            })
            .collect()
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let delays = delay_sequence(20, &config());
        assert_eq!(delays[0], 1000.0);
        assert_eq!(delays[1], 2000.0);
        assert_eq!(delays[4], 16_000.0);
        assert_eq!(delays[5], 30_000.0);
        assert_eq!(delays[19], 30_000.0);
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let delays = delay_sequence(20, &config());
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= 30_000.0));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        for _ in 0..100 {
            let delay = apply_jitter(1000.0, 0.1).as_millis() as f64;
            assert!((900.0..=1100.0).contains(&delay));
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        assert_eq!(apply_jitter(4000.0, 0.0), Duration::from_millis(4000));
    }
}
