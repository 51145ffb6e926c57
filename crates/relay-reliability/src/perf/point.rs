//! Typed metric points stored in fixed-capacity rings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of measurement a point represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Timer,
    Histogram,
}

/// One recorded measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    /// When the point was recorded.
    pub timestamp: DateTime<Utc>,
    /// The measured value.
    pub value: f64,
    /// Point kind.
    pub kind: MetricKind,
    /// Free-form tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl MetricPoint {
    /// Create a point timestamped now.
    pub fn now(kind: MetricKind, value: f64, tags: HashMap<String, String>) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
            kind,
            tags,
        }
    }
}

/// Mean of the values of points newer than `cutoff`, if any.
pub(crate) fn windowed_mean(points: &[MetricPoint], cutoff: DateTime<Utc>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for point in points.iter().rev() {
        if point.timestamp < cutoff {
            break;
        }
        sum += point.value;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Number of points newer than `cutoff`.
pub(crate) fn windowed_count(points: &[MetricPoint], cutoff: DateTime<Utc>) -> usize {
    points
        .iter()
        .rev()
        .take_while(|p| p.timestamp >= cutoff)
        .count()
}

/// Percentile over a set of values (nearest-rank on the sorted copy).
pub(crate) fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((sorted.len() - 1) as f64 * pct).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_at(seconds_ago: i64, value: f64) -> MetricPoint {
        MetricPoint {
            timestamp: Utc::now() - chrono::Duration::seconds(seconds_ago),
            value,
            kind: MetricKind::Gauge,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn test_windowed_mean_ignores_old_points() {
        let points = vec![point_at(600, 100.0), point_at(10, 2.0), point_at(5, 4.0)];
        let cutoff = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(windowed_mean(&points, cutoff), Some(3.0));
    }

    #[test]
    fn test_windowed_mean_empty_window() {
        let points = vec![point_at(600, 100.0)];
        let cutoff = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(windowed_mean(&points, cutoff), None);
    }

    #[test]
    fn test_percentile() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.5), 51.0);
        assert_eq!(percentile(&values, 0.95), 95.0);
        assert_eq!(percentile(&values, 1.0), 100.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }
}
