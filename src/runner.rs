//! Timed execution of a single operation.
//!
//! [`TimedOperationRunner::run`] measures one iteration: it starts the
//! attached samplers, times the operation on a monotonic clock, stops and
//! joins every sampler (also when the operation fails or times out) and
//! reduces the collected samples to one peak per metric.

use crate::probe::MetricProbe;
use crate::sampler::ResourceSampler;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Why an operation call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationError {
    /// Connection or I/O failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The call exceeded the operation timeout.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Non-success HTTP status.
    #[error("HTTP {status_code}: {message}")]
    Status { status_code: u16, message: String },

    /// Response body did not match the expected shape, or the remote
    /// reported an error.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Subprocess could not be started.
    #[error("failed to spawn: {message}")]
    Spawn { message: String },

    /// Subprocess exited unsuccessfully.
    #[error("process exited with {status}")]
    Exit { status: String },
}

impl OperationError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// One logical unit of load: an inference call, an endpoint call, a CLI probe.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Work that must happen before the timed window (not measured).
    async fn prepare(&self) -> Result<(), OperationError> {
        Ok(())
    }

    /// The measured call.
    async fn invoke(&self) -> Result<(), OperationError>;
}

/// Peak of a metric within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Observed(f64),
    /// No sample was taken; never to be read as zero.
    NoData,
}

impl MetricValue {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Observed(v) => Some(v),
            Self::NoData => None,
        }
    }
}

/// Whether the operation succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IterationOutcome {
    Succeeded,
    Failed { error: OperationError },
}

/// Measurements from one iteration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    pub suite: String,
    pub iteration_index: u32,
    /// Wall-clock duration of the operation (elapsed-so-far on failure).
    pub duration_secs: f64,
    /// Metric name → peak value during the operation window.
    pub peak_samples: BTreeMap<String, MetricValue>,
    pub outcome: IterationOutcome,
}

impl IterationResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, IterationOutcome::Succeeded)
    }

    pub fn peak(&self, metric: &str) -> Option<f64> {
        self.peak_samples.get(metric).and_then(|v| v.value())
    }
}

/// Runs operations with timing and optional resource sampling.
#[derive(Debug, Clone, Copy)]
pub struct TimedOperationRunner {
    pub sample_interval: Duration,
    pub operation_timeout: Duration,
}

impl TimedOperationRunner {
    pub fn new(sample_interval: Duration, operation_timeout: Duration) -> Self {
        Self {
            sample_interval,
            operation_timeout,
        }
    }

    /// Measure one call of `operation` with `probes` sampled alongside.
    pub async fn run(
        &self,
        suite: &str,
        iteration_index: u32,
        operation: &dyn Operation,
        probes: &[Arc<dyn MetricProbe>],
    ) -> IterationResult {
        let mut peak_samples = BTreeMap::new();

        if let Err(error) = self.bounded(operation.prepare()).await {
            for probe in probes {
                for metric in probe.metrics() {
                    peak_samples.insert(metric, MetricValue::NoData);
                }
            }
            return IterationResult {
                suite: suite.to_owned(),
                iteration_index,
                duration_secs: 0.0,
                peak_samples,
                outcome: IterationOutcome::Failed { error },
            };
        }

        let start = Instant::now();
        let samplers: Vec<_> = probes
            .iter()
            .map(|probe| ResourceSampler::start(Arc::clone(probe), self.sample_interval))
            .collect();

        let result = self.bounded(operation.invoke()).await;
        let end = Instant::now();
        let duration_secs = end.duration_since(start).as_secs_f64();

        for sampler in samplers {
            let run = sampler.stop().await;
            for metric in &run.metrics {
                peak_samples.insert(metric.clone(), MetricValue::NoData);
            }
            for (metric, peak) in run.peaks_until(end) {
                peak_samples.insert(metric, MetricValue::Observed(peak));
            }
        }

        let outcome = match result {
            Ok(()) => IterationOutcome::Succeeded,
            Err(error) => IterationOutcome::Failed { error },
        };
        debug!(
            suite,
            iteration = iteration_index,
            operation = operation.name(),
            duration_secs,
            ok = matches!(outcome, IterationOutcome::Succeeded),
            "iteration finished"
        );

        IterationResult {
            suite: suite.to_owned(),
            iteration_index,
            duration_secs,
            peak_samples,
            outcome,
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<(), OperationError>
    where
        F: std::future::Future<Output = Result<(), OperationError>>,
    {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OperationError::Timeout {
                timeout_ms: u64::try_from(self.operation_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
