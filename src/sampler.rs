//! Background resource sampling.
//!
//! [`ResourceSampler::start`] spawns a polling loop that reads a
//! [`MetricProbe`] immediately and then every `interval`, buffering samples
//! locally until [`SamplerHandle::stop`] is called. `stop` cancels the loop
//! and waits for it to exit, so once it returns no further sample can be
//! attributed to the finished window.

use crate::probe::{MetricProbe, ProbeReading, Sample};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Samples collected by one sampler run.
#[derive(Debug, Clone, Default)]
pub struct SamplerRun {
    /// Probe name.
    pub probe: String,
    /// Metrics the probe declares.
    pub metrics: Vec<String>,
    /// Samples in read order.
    pub samples: Vec<Sample>,
    /// Set when at least one read came back unavailable.
    pub unavailable: Option<String>,
}

impl SamplerRun {
    /// Maximum per metric over samples taken at or before `until`.
    ///
    /// Metrics with no qualifying sample are absent from the result.
    pub fn peaks_until(&self, until: Instant) -> Vec<(String, f64)> {
        let mut peaks: Vec<(String, f64)> = Vec::new();
        for sample in self.samples.iter().filter(|s| s.timestamp <= until) {
            match peaks.iter_mut().find(|(m, _)| *m == sample.metric) {
                Some((_, peak)) => *peak = peak.max(sample.value),
                None => peaks.push((sample.metric.clone(), sample.value)),
            }
        }
        peaks
    }
}

/// Starts sampling loops.
pub struct ResourceSampler;

impl ResourceSampler {
    /// Spawn a sampling loop for `probe`.
    pub fn start(probe: Arc<dyn MetricProbe>, interval: Duration) -> SamplerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(sample_loop(probe, interval, token));
        SamplerHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Running sampler. Dropping it without `stop` cancels the loop.
pub struct SamplerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<SamplerRun>>,
}

impl SamplerHandle {
    /// Signal the loop to stop and wait until it has exited.
    pub async fn stop(mut self) -> SamplerRun {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return SamplerRun::default();
        };
        match task.await {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "sampler task ended abnormally");
                SamplerRun {
                    unavailable: Some(format!("sampler task failed: {e}")),
                    ..SamplerRun::default()
                }
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn sample_loop(
    probe: Arc<dyn MetricProbe>,
    interval: Duration,
    cancel: CancellationToken,
) -> SamplerRun {
    let mut run = SamplerRun {
        probe: probe.name().to_owned(),
        metrics: probe.metrics(),
        ..SamplerRun::default()
    };
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let timestamp = Instant::now();
                let reading = probe.read().await;
                if let ProbeReading::Unavailable { reason } = &reading {
                    if run.unavailable.is_none() {
                        debug!(probe = %run.probe, %reason, "probe unavailable");
                    }
                    run.unavailable = Some(reason.clone());
                }
                run.samples.extend(reading.into_samples(timestamp));
            }
        }
    }

    debug!(probe = %run.probe, samples = run.samples.len(), "sampler stopped");
    run
}
