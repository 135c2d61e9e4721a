//! Summary statistics over per-iteration observations.

use serde::{Deserialize, Serialize};

/// Min / max / mean / median of a non-empty series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Middle value; mean of the two middle values for an even count.
    pub median: f64,
}

/// Unit a metric was recorded in. Thresholds are compared in the same unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Seconds,
    Megabytes,
    Percent,
    Celsius,
}

impl Unit {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Megabytes => " MB",
            Self::Percent => "%",
            Self::Celsius => " °C",
        }
    }
}

/// Statistics for one metric of one suite.
///
/// `summary` is `None` when no measured value was available; such a record
/// renders as undefined and never takes part in recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteStatistics {
    /// Suite the values were measured in.
    pub suite_name: String,
    /// Tracked metric, e.g. `duration` or `gpu_memory_used_mb`.
    pub metric_name: String,
    /// Unit of every value in `summary`.
    pub unit: Unit,
    /// Number of observed values that went into `summary`.
    pub sample_count: usize,
    /// `None` when no iteration observed the metric.
    pub summary: Option<Summary>,
}

impl SuiteStatistics {
    pub fn is_defined(&self) -> bool {
        self.summary.is_some()
    }

    pub fn min(&self) -> Option<f64> {
        self.summary.map(|s| s.min)
    }

    pub fn max(&self) -> Option<f64> {
        self.summary.map(|s| s.max)
    }

    pub fn mean(&self) -> Option<f64> {
        self.summary.map(|s| s.mean)
    }

    pub fn median(&self) -> Option<f64> {
        self.summary.map(|s| s.median)
    }
}

/// Summarize `values` after dropping the first `warmup_count` entries.
///
/// The orchestrator discards warmup iterations itself and passes `0` here;
/// the parameter exists for callers holding a raw series.
pub fn summarize(values: &[f64], warmup_count: usize) -> Option<Summary> {
    let measured = values.get(warmup_count..).unwrap_or(&[]);
    if measured.is_empty() {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in measured {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    let raw_mean = sum / measured.len() as f64;
    // Summation rounding can land a hair outside [min, max].
    let mean = if min <= max {
        raw_mean.clamp(min, max)
    } else {
        raw_mean
    };

    let mut sorted = measured.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    };

    Some(Summary {
        min,
        max,
        mean,
        median,
    })
}

/// Build a [`SuiteStatistics`] record for one metric series.
pub fn suite_statistics(
    suite_name: &str,
    metric_name: &str,
    unit: Unit,
    values: &[f64],
    warmup_count: usize,
) -> SuiteStatistics {
    SuiteStatistics {
        suite_name: suite_name.to_owned(),
        metric_name: metric_name.to_owned(),
        unit,
        sample_count: values.len().saturating_sub(warmup_count),
        summary: summarize(values, warmup_count),
    }
}
