//! Metric probes: on-demand, timestamped readings of numeric metrics.
//!
//! A [`MetricProbe`] returns either a mapping of metric name → value or an
//! explicit [`ProbeReading::Unavailable`] when the underlying tool or
//! hardware is absent. An unavailable probe never reports zeros.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// GPU memory in use, MB.
pub const GPU_MEMORY_USED_MB: &str = "gpu_memory_used_mb";
/// Total GPU memory, MB.
pub const GPU_MEMORY_TOTAL_MB: &str = "gpu_memory_total_mb";
/// GPU utilization, percent.
pub const GPU_UTILIZATION_PCT: &str = "gpu_utilization_pct";
/// GPU temperature, degrees Celsius.
pub const GPU_TEMPERATURE_C: &str = "gpu_temperature_c";

/// Fields requested from the GPU tool, in output column order.
const GPU_QUERY: &str = "memory.used,memory.total,utilization.gpu,temperature.gpu";
const GPU_METRICS: [&str; 4] = [
    GPU_MEMORY_USED_MB,
    GPU_MEMORY_TOTAL_MB,
    GPU_UTILIZATION_PCT,
    GPU_TEMPERATURE_C,
];

/// One reading of a single metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Metric name, e.g. [`GPU_MEMORY_USED_MB`].
    pub metric: String,
    /// Reading in the metric's unit.
    pub value: f64,
    /// Monotonic time at which the read was issued.
    pub timestamp: Instant,
}

/// Result of one probe read.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeReading {
    /// Metric name → value. Metrics the source could not report are omitted.
    Values(BTreeMap<String, f64>),
    /// The probe tool or hardware is absent.
    Unavailable {
        /// Why no data could be read.
        reason: String,
    },
}

impl ProbeReading {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Values(_))
    }

    /// Convert into samples stamped with `timestamp`; empty when unavailable.
    pub fn into_samples(self, timestamp: Instant) -> Vec<Sample> {
        match self {
            Self::Values(values) => values
                .into_iter()
                .map(|(metric, value)| Sample {
                    metric,
                    value,
                    timestamp,
                })
                .collect(),
            Self::Unavailable { .. } => Vec::new(),
        }
    }
}

/// A pluggable source of metric readings.
#[async_trait]
pub trait MetricProbe: Send + Sync {
    /// Short probe name used in logs and skip reasons.
    fn name(&self) -> &str;

    /// Every metric name this probe can report.
    fn metrics(&self) -> Vec<String>;

    /// Take one reading.
    async fn read(&self) -> ProbeReading;
}

/// GPU probe backed by `nvidia-smi`-style CSV output.
#[derive(Debug, Clone)]
pub struct GpuProbe {
    program: String,
    timeout: Duration,
}

impl GpuProbe {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Whether the probe program is on `PATH`.
    pub fn is_installed(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Best-effort GPU model name, for the report header.
    pub async fn gpu_name(&self) -> Option<String> {
        let stdout = self
            .query(&["--query-gpu=name", "--format=csv,noheader"])
            .await
            .ok()?;
        let names: Vec<&str> = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join(", "))
        }
    }

    async fn query(&self, args: &[&str]) -> Result<String, String> {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("{} could not be run: {e}", self.program)),
            Err(_) => {
                return Err(format!(
                    "{} timed out after {}ms",
                    self.program,
                    self.timeout.as_millis()
                ));
            }
        };
        if !output.status.success() {
            return Err(format!("{} exited with {}", self.program, output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MetricProbe for GpuProbe {
    fn name(&self) -> &str {
        "gpu"
    }

    fn metrics(&self) -> Vec<String> {
        GPU_METRICS.iter().map(|m| (*m).to_owned()).collect()
    }

    async fn read(&self) -> ProbeReading {
        let args = [
            format!("--query-gpu={GPU_QUERY}"),
            "--format=csv,noheader,nounits".to_owned(),
        ];
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.query(&args).await {
            Ok(stdout) => parse_gpu_csv(&stdout),
            Err(reason) => {
                debug!(probe = "gpu", %reason, "gpu probe unavailable");
                ProbeReading::Unavailable { reason }
            }
        }
    }
}

/// Parse `memory.used, memory.total, utilization.gpu, temperature.gpu` rows.
///
/// Multiple rows (one per device) are combined: memory is summed, utilization
/// and temperature take the hottest device. Fields the tool reports as
/// `[N/A]` are left out rather than read as zero.
pub fn parse_gpu_csv(stdout: &str) -> ProbeReading {
    let mut columns: [Vec<f64>; 4] = Default::default();
    let mut rows = 0usize;

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < GPU_METRICS.len() {
            return ProbeReading::Unavailable {
                reason: format!("unexpected gpu probe row: {line:?}"),
            };
        }
        rows += 1;
        for (column, field) in columns.iter_mut().zip(fields) {
            if let Ok(value) = field.parse::<f64>()
                && value.is_finite()
            {
                column.push(value);
            }
        }
    }

    if rows == 0 {
        return ProbeReading::Unavailable {
            reason: "gpu probe returned no devices".to_owned(),
        };
    }

    let mut values = BTreeMap::new();
    for (index, (metric, column)) in GPU_METRICS.iter().zip(&columns).enumerate() {
        if column.is_empty() {
            continue;
        }
        let combined = if index < 2 {
            column.iter().sum()
        } else {
            column.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        };
        values.insert((*metric).to_owned(), combined);
    }

    if values.is_empty() {
        ProbeReading::Unavailable {
            reason: "gpu probe reported no numeric fields".to_owned(),
        }
    } else {
        ProbeReading::Values(values)
    }
}
