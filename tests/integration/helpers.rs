//! Shared fakes for integration tests.

use async_trait::async_trait;
use stackbench::config::BenchConfig;
use stackbench::probe::{GPU_UTILIZATION_PCT, MetricProbe, ProbeReading};
use stackbench::startup::{LaunchCommand, Launcher};
use stackbench::system_info::SystemInfo;
use stackbench::{Operation, OperationError};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Sleeps for `delay` per call and fails on the listed 1-based call numbers.
pub(crate) struct FakeOperation {
    pub delay: Duration,
    pub fail_on: Vec<u32>,
    pub calls: AtomicU32,
}

impl FakeOperation {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_on: Vec::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn failing_on(mut self, calls: &[u32]) -> Self {
        self.fail_on = calls.to_vec();
        self
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for FakeOperation {
    fn name(&self) -> &str {
        "fake"
    }

    async fn invoke(&self) -> Result<(), OperationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.fail_on.contains(&n) {
            Err(OperationError::transport("connection reset by peer"))
        } else {
            Ok(())
        }
    }
}

/// Reports a constant GPU utilization.
pub(crate) struct FixedGpuProbe(pub f64);

#[async_trait]
impl MetricProbe for FixedGpuProbe {
    fn name(&self) -> &str {
        "fixed-gpu"
    }

    fn metrics(&self) -> Vec<String> {
        vec![GPU_UTILIZATION_PCT.to_owned()]
    }

    async fn read(&self) -> ProbeReading {
        ProbeReading::Values(BTreeMap::from([(GPU_UTILIZATION_PCT.to_owned(), self.0)]))
    }
}

/// A GPU probe whose tool is not installed.
pub(crate) struct AbsentGpuProbe;

#[async_trait]
impl MetricProbe for AbsentGpuProbe {
    fn name(&self) -> &str {
        "gpu"
    }

    fn metrics(&self) -> Vec<String> {
        vec![GPU_UTILIZATION_PCT.to_owned()]
    }

    async fn read(&self) -> ProbeReading {
        ProbeReading::Unavailable {
            reason: "nvidia-smi not found".to_owned(),
        }
    }
}

/// Records start requests and answers them with fixed results.
#[derive(Default)]
pub(crate) struct RecordingLauncher {
    pub managed_ok: bool,
    pub direct_ok: bool,
    pub calls: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher for RecordingLauncher {
    async fn run_managed(&self, command: &LaunchCommand) -> Result<(), String> {
        self.calls.lock().unwrap().push(format!("managed: {command}"));
        if self.managed_ok {
            Ok(())
        } else {
            Err("unit ollama.service not found".to_owned())
        }
    }

    async fn spawn_direct(&self, command: &LaunchCommand) -> Result<(), String> {
        self.calls.lock().unwrap().push(format!("direct: {command}"));
        if self.direct_ok {
            Ok(())
        } else {
            Err("No such file or directory".to_owned())
        }
    }
}

/// Config with no pauses and a fast sampler.
pub(crate) fn quick_config(iterations: u32, warmup: u32) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.run.iterations = iterations;
    config.run.warmup = warmup;
    config.run.iteration_pause_ms = 0;
    config.run.sample_interval_ms = 10;
    config.run.operation_timeout_secs = 5;
    config.tools.auth_token = Some("test-token".to_owned());
    config
}

pub(crate) fn fixed_system_info() -> SystemInfo {
    SystemInfo {
        hostname: Some("bench-host".to_owned()),
        os: "linux".to_owned(),
        arch: "x86_64".to_owned(),
        cpu: Some("Test CPU @ 3.0GHz".to_owned()),
        total_memory_mb: Some(65_536),
        gpu: Some("Test GPU 24GB".to_owned()),
        model: "llama3.2:3b".to_owned(),
    }
}
