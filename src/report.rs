//! Report assembly, rendering and output.
//!
//! The rendered text is a plain markdown-like document with fixed section
//! headers and four stat lines per metric. Rendering is a pure function of
//! the report value, so identical inputs (with a frozen timestamp) produce
//! byte-identical output.

use crate::error::{BenchError, Result};
use crate::probe::{GPU_MEMORY_TOTAL_MB, GPU_MEMORY_USED_MB, GPU_TEMPERATURE_C, GPU_UTILIZATION_PCT};
use crate::stats::{SuiteStatistics, Unit};
use crate::suites::DURATION;
use crate::system_info::SystemInfo;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What happened to one suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    Completed {
        statistics: Vec<SuiteStatistics>,
        /// Measured iterations that failed twice and were excluded.
        failed_iterations: u32,
    },
    Skipped {
        reason: String,
    },
}

/// One suite's section of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSection {
    pub name: String,
    pub title: String,
    pub outcome: SectionOutcome,
}

impl SuiteSection {
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, SectionOutcome::Skipped { .. })
    }
}

/// Threshold verdict. Every threshold is lower-is-better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Good,
    Acceptable,
    Poor,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Good => "good",
            Self::Acceptable => "acceptable",
            Self::Poor => "poor",
        })
    }
}

/// Fixed three-tier bounds for one metric kind, in the metric's own unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    /// `None` applies to the metric in any suite.
    pub suite: Option<&'static str>,
    pub metric: &'static str,
    pub unit: Unit,
    /// Mean at or below this is good.
    pub good: f64,
    /// Mean at or below this (and above `good`) is acceptable.
    pub acceptable: f64,
    pub advice: &'static str,
}

impl Threshold {
    pub fn applies_to(&self, stats: &SuiteStatistics) -> bool {
        self.metric == stats.metric_name
            && self.unit == stats.unit
            && self.suite.is_none_or(|s| s == stats.suite_name)
    }

    pub fn classify(&self, mean: f64) -> Tier {
        if mean <= self.good {
            Tier::Good
        } else if mean <= self.acceptable {
            Tier::Acceptable
        } else {
            Tier::Poor
        }
    }
}

pub const THRESHOLDS: &[Threshold] = &[
    Threshold {
        suite: Some("model-load"),
        metric: DURATION,
        unit: Unit::Seconds,
        good: 5.0,
        acceptable: 15.0,
        advice: "consider a smaller or more heavily quantized model, or faster storage",
    },
    Threshold {
        suite: Some("inference"),
        metric: DURATION,
        unit: Unit::Seconds,
        good: 2.0,
        acceptable: 10.0,
        advice: "check that the model runs fully on the GPU and is not swapping layers to CPU",
    },
    Threshold {
        suite: Some("endpoint-latency"),
        metric: DURATION,
        unit: Unit::Seconds,
        good: 0.1,
        acceptable: 0.5,
        advice: "check tool-server container resources and network path",
    },
    Threshold {
        suite: None,
        metric: GPU_MEMORY_USED_MB,
        unit: Unit::Megabytes,
        good: 8_000.0,
        acceptable: 12_000.0,
        advice: "GPU memory is tight; use a smaller context window or model",
    },
    Threshold {
        suite: None,
        metric: GPU_TEMPERATURE_C,
        unit: Unit::Celsius,
        good: 70.0,
        acceptable: 83.0,
        advice: "improve cooling or lower the GPU power limit",
    },
];

/// One threshold comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Suite machine name.
    pub suite: String,
    /// Metric the threshold was applied to.
    pub metric: String,
    /// Verdict for `mean`.
    pub tier: Tier,
    /// Mean value compared against the threshold.
    pub mean: f64,
    /// Human-readable line for the report.
    pub message: String,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.tier, self.message)
    }
}

/// Compare each defined statistic's mean against [`THRESHOLDS`].
///
/// Undefined statistics and skipped suites never produce a recommendation.
pub fn recommend(sections: &[SuiteSection]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for section in sections {
        let SectionOutcome::Completed { statistics, .. } = &section.outcome else {
            continue;
        };
        for stats in statistics {
            let Some(mean) = stats.mean() else {
                continue;
            };
            let Some(threshold) = THRESHOLDS.iter().find(|t| t.applies_to(stats)) else {
                continue;
            };
            let tier = threshold.classify(mean);
            let label = metric_label(&stats.metric_name).to_lowercase();
            let value = format_value(mean, stats.unit);
            let message = match tier {
                Tier::Good => format!(
                    "{}: mean {label} {value} is good (<= {})",
                    section.title,
                    format_value(threshold.good, stats.unit)
                ),
                Tier::Acceptable => format!(
                    "{}: mean {label} {value} is acceptable (<= {}); {}",
                    section.title,
                    format_value(threshold.acceptable, stats.unit),
                    threshold.advice
                ),
                Tier::Poor => format!(
                    "{}: mean {label} {value} is poor (> {}); {}",
                    section.title,
                    format_value(threshold.acceptable, stats.unit),
                    threshold.advice
                ),
            };
            out.push(Recommendation {
                suite: section.name.clone(),
                metric: stats.metric_name.clone(),
                tier,
                mean,
                message,
            });
        }
    }
    out
}

/// The final run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub generated_at: DateTime<Utc>,
    pub system_info: SystemInfo,
    pub iterations: u32,
    pub warmup: u32,
    pub sections: Vec<SuiteSection>,
    pub recommendations: Vec<Recommendation>,
}

impl BenchmarkReport {
    /// Assemble a report; recommendations are derived from `sections`.
    pub fn new(
        generated_at: DateTime<Utc>,
        system_info: SystemInfo,
        iterations: u32,
        warmup: u32,
        sections: Vec<SuiteSection>,
    ) -> Self {
        let recommendations = recommend(&sections);
        Self {
            generated_at,
            system_info,
            iterations,
            warmup,
            sections,
            recommendations,
        }
    }

    pub fn section(&self, name: &str) -> Option<&SuiteSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Render the human-readable report.
    pub fn render(&self) -> String {
        let info = &self.system_info;
        let mut lines = vec![
            "# Benchmark Report".to_owned(),
            String::new(),
            format!(
                "Generated: {}",
                self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            format!(
                "Iterations: {} measured, {} warmup",
                self.iterations, self.warmup
            ),
            String::new(),
            "## System Information".to_owned(),
            String::new(),
            format!("Hostname: {}", or_unknown(info.hostname.as_deref())),
            format!("OS: {} ({})", info.os, info.arch),
            format!("CPU: {}", or_unknown(info.cpu.as_deref())),
            format!(
                "Memory: {}",
                info.total_memory_mb
                    .map_or_else(|| "unknown".to_owned(), |mb| format!("{mb} MB"))
            ),
            format!("GPU: {}", info.gpu.as_deref().unwrap_or("not detected")),
            format!("Model: {}", info.model),
        ];

        for section in &self.sections {
            lines.push(String::new());
            lines.push(format!("## {}", section.title));
            lines.push(String::new());
            match &section.outcome {
                SectionOutcome::Skipped { reason } => {
                    lines.push(format!("Status: skipped ({reason})"));
                }
                SectionOutcome::Completed {
                    statistics,
                    failed_iterations,
                } => {
                    lines.push(format!(
                        "Status: completed ({failed_iterations} failed iteration(s) excluded)"
                    ));
                    for stats in statistics {
                        lines.push(String::new());
                        lines.extend(render_statistics(stats));
                    }
                }
            }
        }

        lines.push(String::new());
        lines.push("## Recommendations".to_owned());
        lines.push(String::new());
        if self.recommendations.is_empty() {
            lines.push("- No thresholded metric was measured.".to_owned());
        } else {
            lines.extend(self.recommendations.iter().map(|r| format!("- {r}")));
        }

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    /// Pretty JSON form of the report.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BenchError::Report(format!("failed to serialize report: {e}")))
    }
}

fn render_statistics(stats: &SuiteStatistics) -> Vec<String> {
    let mut lines = vec![
        format!("### {}", metric_label(&stats.metric_name)),
        String::new(),
        format!("Samples: {}", stats.sample_count),
    ];
    match stats.summary {
        Some(s) => {
            lines.push(format!("Min: {}", format_value(s.min, stats.unit)));
            lines.push(format!("Max: {}", format_value(s.max, stats.unit)));
            lines.push(format!("Mean: {}", format_value(s.mean, stats.unit)));
            lines.push(format!("Median: {}", format_value(s.median, stats.unit)));
        }
        None => {
            for label in ["Min", "Max", "Mean", "Median"] {
                lines.push(format!("{label}: no data"));
            }
        }
    }
    lines
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("unknown")
}

/// Human label for a metric name.
pub fn metric_label(metric: &str) -> String {
    match metric {
        DURATION => "Duration".to_owned(),
        GPU_MEMORY_USED_MB => "GPU memory used".to_owned(),
        GPU_MEMORY_TOTAL_MB => "GPU memory total".to_owned(),
        GPU_UTILIZATION_PCT => "GPU utilization".to_owned(),
        GPU_TEMPERATURE_C => "GPU temperature".to_owned(),
        other => other.to_owned(),
    }
}

/// Format `value` with the unit's suffix.
pub fn format_value(value: f64, unit: Unit) -> String {
    match unit {
        Unit::Seconds => format!("{value:.3}{}", unit.suffix()),
        Unit::Megabytes | Unit::Percent | Unit::Celsius => {
            format!("{value:.1}{}", unit.suffix())
        }
    }
}

/// Write `text` to `path` (replacing any previous contents) or to stdout.
pub fn write_report(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// `report.md` → `report.md.json`.
pub fn json_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".json");
    PathBuf::from(os)
}

/// Write the JSON report next to the text report.
pub fn write_json(report: &BenchmarkReport, text_path: &Path) -> Result<PathBuf> {
    let path = json_path(text_path);
    std::fs::write(&path, report.to_json()?)?;
    Ok(path)
}
