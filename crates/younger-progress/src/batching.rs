//! Batching policy for cross-process progress traffic.
//!
//! A worker only transmits once it has buffered at least `interval` units,
//! which bounds the number of messages per run to roughly `100 / percent`
//! regardless of the total.

use crate::config::BatchingConfig;
use crate::error::{ProgressError, Result};

/// Validated flush percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchingPolicy {
    percent: f64,
}

impl BatchingPolicy {
    /// Create a policy from a percentage of the total (e.g. `0.1` for 0.1%).
    ///
    /// Percentages above 100 are accepted; the interval then exceeds the
    /// total and every worker sends its whole count on `done()`.
    pub fn new(percent: f64) -> Result<Self> {
        if !percent.is_finite() || percent <= 0.0 {
            return Err(ProgressError::config(
                "percent",
                format!("must be a positive finite number, got {}", percent),
            ));
        }
        Ok(Self { percent })
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Minimum number of buffered units that justifies a transmission.
    pub fn interval(&self, total: u64) -> u64 {
        flush_interval(total, self.percent)
    }
}

impl Default for BatchingPolicy {
    fn default() -> Self {
        Self {
            percent: BatchingConfig::DEFAULT_PERCENT,
        }
    }
}

/// `max(1, floor(total * percent / 100))`.
///
/// A zero total or a sub-unit product clamps to 1 so every unit is eventually
/// flushed.
pub fn flush_interval(total: u64, percent: f64) -> u64 {
    let raw = (total as f64 * percent / 100.0).floor();
    if raw.is_finite() && raw >= 1.0 {
        raw as u64
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_half_percent_of_thousand() {
        assert_eq!(flush_interval(1000, 0.5), 5);
    }

    #[test]
    fn test_interval_ten_percent_of_hundred() {
        let policy = BatchingPolicy::new(10.0).unwrap();
        assert_eq!(policy.interval(100), 10);
    }

    #[test]
    fn test_interval_clamps_to_one() {
        assert_eq!(flush_interval(0, 10.0), 1);
        assert_eq!(flush_interval(10, 0.1), 1);
        assert_eq!(flush_interval(1, 99.0), 1);
    }

    #[test]
    fn test_interval_floors() {
        assert_eq!(flush_interval(999, 1.0), 9);
        assert_eq!(flush_interval(1_000_000, 0.1), 1000);
    }

    #[test]
    fn test_rejects_invalid_percent() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = BatchingPolicy::new(bad).unwrap_err();
            assert!(
                matches!(err, ProgressError::Configuration { ref field, .. } if field == "percent"),
                "percent {} should be rejected, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_percent_above_hundred_exceeds_total() {
        let policy = BatchingPolicy::new(250.0).unwrap();
        assert_eq!(policy.interval(10), 25);
    }

    #[test]
    fn test_default_policy() {
        let policy = BatchingPolicy::default();
        assert_eq!(policy.percent(), BatchingConfig::DEFAULT_PERCENT);
        assert_eq!(policy.interval(1000), 5);
    }
}
