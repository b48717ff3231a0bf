use serde::{Deserialize, Serialize};

/// Baseline statistics for a metric over a trailing window that excludes
/// the bucket under evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub median: f64,
    pub sample_count: usize,
}

impl BaselineStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            median,
            sample_count: values.len(),
        })
    }

    /// |observed - mean| in standard deviations, with the deviation floored
    /// at `epsilon` so a flat baseline never divides by zero.
    pub fn z_score(&self, observed: f64, epsilon: f64) -> f64 {
        (observed - self.mean).abs() / self.std_dev.max(epsilon)
    }
}

/// Percent change from `expected` to `observed`. A near-zero expectation
/// reports ±100% for any non-zero observation.
pub fn percent_change(observed: f64, expected: f64, epsilon: f64) -> f64 {
    if expected.abs() < epsilon {
        if observed.abs() < epsilon {
            0.0
        } else {
            100.0 * observed.signum()
        }
    } else {
        (observed - expected) / expected.abs() * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats() {
        let stats = BaselineStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
        assert_eq!(stats.median, 4.5);
        assert_eq!(stats.sample_count, 8);
        assert!(BaselineStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_flat_baseline_z_score() {
        let stats = BaselineStats::from_values(&[10.0, 10.0, 10.0]).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.z_score(10.0, 1e-9), 0.0);
        assert!(stats.z_score(11.0, 1e-9).is_finite());
    }

    #[test]
    fn test_percent_change() {
        assert!((percent_change(1000.0, 10.0, 1e-9) - 9900.0).abs() < 1e-9);
        assert_eq!(percent_change(5.0, 10.0, 1e-9), -50.0);
        assert_eq!(percent_change(3.0, 0.0, 1e-9), 100.0);
        assert_eq!(percent_change(0.0, 0.0, 1e-9), 0.0);
    }
}
