//! Benchmark suite definitions.
//!
//! A [`Suite`] bundles one [`Operation`] with the probes sampled alongside
//! it and the metrics reduced into statistics afterwards. The standard set
//! mirrors the stack under test:
//!
//! | Suite              | Operation            | Tags  | Needs     |
//! |--------------------|----------------------|-------|-----------|
//! | `model-load`       | cold model load      | gpu   | inference |
//! | `inference`        | one generation       | gpu   | inference |
//! | `resource`         | one generation + GPU | gpu   | inference |
//! | `endpoint-latency` | one JSON-RPC call    | mcp   | tools     |
//! | `[[command_suites]]` | one CLI invocation | -     | -         |

use crate::config::BenchConfig;
use crate::ops::{CommandOperation, GenerateOperation, JsonRpcOperation, ModelLoadOperation};
use crate::probe::{
    GPU_MEMORY_USED_MB, GPU_TEMPERATURE_C, GPU_UTILIZATION_PCT, GpuProbe, MetricProbe,
};
use crate::runner::Operation;
use crate::stats::Unit;
use std::sync::Arc;
use std::time::Duration;

/// Name of the duration metric every timed suite tracks.
pub const DURATION: &str = "duration";

/// A collaborator a suite depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Service {
    Inference,
    Tools,
}

/// Filter tags used by `--gpu-only` / `--mcp-only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuiteTag {
    Gpu,
    Mcp,
}

/// Where a tracked metric's per-iteration value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricSource {
    /// Wall-clock duration of the operation.
    Duration,
    /// Peak of a sampled metric.
    Peak(String),
}

/// A metric reduced into statistics for a suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedMetric {
    /// Name in the report and in [`SuiteStatistics`](crate::stats::SuiteStatistics).
    pub name: String,
    /// How the per-iteration value is obtained.
    pub source: MetricSource,
    /// Unit of the per-iteration value.
    pub unit: Unit,
}

impl TrackedMetric {
    pub fn duration() -> Self {
        Self {
            name: DURATION.to_owned(),
            source: MetricSource::Duration,
            unit: Unit::Seconds,
        }
    }

    pub fn peak(metric: &str, unit: Unit) -> Self {
        Self {
            name: metric.to_owned(),
            source: MetricSource::Peak(metric.to_owned()),
            unit,
        }
    }
}

/// Something that must hold before a suite can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `program` must resolve on `PATH`.
    Program(String),
    /// Every attached probe must return data on a trial read.
    ProbeData,
}

/// One named group of repeated measurements.
#[derive(Clone)]
pub struct Suite {
    /// Machine name, e.g. `inference`.
    pub name: String,
    /// Report section title, e.g. `Inference`.
    pub title: String,
    pub tags: Vec<SuiteTag>,
    /// Optional suites are skipped instead of failing the run.
    pub optional: bool,
    pub services: Vec<Service>,
    pub requirements: Vec<Requirement>,
    pub operation: Arc<dyn Operation>,
    pub probes: Vec<Arc<dyn MetricProbe>>,
    pub metrics: Vec<TrackedMetric>,
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("optional", &self.optional)
            .field("operation", &self.operation.name())
            .field("probes", &self.probes.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Suite {
    /// A required, untagged suite timing `operation` only.
    pub fn new(name: &str, title: &str, operation: Arc<dyn Operation>) -> Self {
        Self {
            name: name.to_owned(),
            title: title.to_owned(),
            tags: Vec::new(),
            optional: false,
            services: Vec::new(),
            requirements: Vec::new(),
            operation,
            probes: Vec::new(),
            metrics: vec![TrackedMetric::duration()],
        }
    }

    pub fn tagged(mut self, tag: SuiteTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn needs(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Sample `probe` during every iteration.
    pub fn with_probe(mut self, probe: Arc<dyn MetricProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Replace the tracked metrics.
    pub fn tracking(mut self, metrics: Vec<TrackedMetric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn has_tag(&self, tag: SuiteTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// `--gpu-only` / `--mcp-only`. Both set selects the union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteFilter {
    pub gpu_only: bool,
    pub mcp_only: bool,
}

impl SuiteFilter {
    pub fn matches(&self, suite: &Suite) -> bool {
        if !self.gpu_only && !self.mcp_only {
            return true;
        }
        (self.gpu_only && suite.has_tag(SuiteTag::Gpu))
            || (self.mcp_only && suite.has_tag(SuiteTag::Mcp))
    }

    pub fn apply(&self, suites: Vec<Suite>) -> Vec<Suite> {
        suites.into_iter().filter(|s| self.matches(s)).collect()
    }
}

/// Services the given suites depend on, deduplicated and in a fixed order.
pub fn required_services(suites: &[Suite]) -> Vec<Service> {
    let mut services: Vec<Service> = suites
        .iter()
        .flat_map(|s| s.services.iter().copied())
        .collect();
    services.sort();
    services.dedup();
    services
}

/// The GPU probe configured in `config`.
pub fn gpu_probe(config: &BenchConfig) -> GpuProbe {
    GpuProbe::new(
        config.gpu.program.clone(),
        Duration::from_millis(config.gpu.probe_timeout_ms),
    )
}

/// Build the standard suites plus any configured command suites.
pub fn standard_suites(config: &BenchConfig, client: reqwest::Client) -> Vec<Suite> {
    let inference = &config.inference;
    let endpoint = inference.endpoint();
    let generate_url = endpoint.url(&inference.generate_path);
    let gpu: Arc<dyn MetricProbe> = Arc::new(gpu_probe(config));

    let generate: Arc<dyn Operation> = Arc::new(GenerateOperation::new(
        client.clone(),
        generate_url.clone(),
        inference.model.clone(),
        inference.prompt.clone(),
    ));

    let tools = &config.tools;
    let rpc_url = tools.endpoint().url(&tools.rpc_path);

    let mut suites = vec![
        Suite::new(
            "model-load",
            "Model Loading",
            Arc::new(ModelLoadOperation::new(
                client.clone(),
                generate_url,
                inference.model.clone(),
            )),
        )
        .tagged(SuiteTag::Gpu)
        .needs(Service::Inference),
        Suite::new("inference", "Inference", Arc::clone(&generate))
            .tagged(SuiteTag::Gpu)
            .needs(Service::Inference),
        Suite::new("resource", "Resource Usage", generate)
            .tagged(SuiteTag::Gpu)
            .optional(true)
            .needs(Service::Inference)
            .requires(Requirement::Program(config.gpu.program.clone()))
            .requires(Requirement::ProbeData)
            .with_probe(gpu)
            .tracking(vec![
                TrackedMetric::peak(GPU_MEMORY_USED_MB, Unit::Megabytes),
                TrackedMetric::peak(GPU_UTILIZATION_PCT, Unit::Percent),
                TrackedMetric::peak(GPU_TEMPERATURE_C, Unit::Celsius),
            ]),
        Suite::new(
            "endpoint-latency",
            "Endpoint Latency",
            Arc::new(JsonRpcOperation::new(
                client,
                rpc_url,
                tools.rpc_method.clone(),
                tools.auth_token.clone().unwrap_or_default(),
            )),
        )
        .tagged(SuiteTag::Mcp)
        .needs(Service::Tools),
    ];

    for command in &config.command_suites {
        suites.push(
            Suite::new(
                &command.name,
                &command.name,
                Arc::new(CommandOperation::new(
                    command.name.clone(),
                    command.program.clone(),
                    command.args.clone(),
                )),
            )
            .optional(command.optional)
            .requires(Requirement::Program(command.program.clone())),
        );
    }

    suites
}
