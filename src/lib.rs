//! stackbench: startup gating and repeated-load benchmarking for a local
//! inference server and an MCP tool server.
//!
//! # Architecture
//!
//! A run is a straight sequence driven by [`BenchmarkOrchestrator`]:
//! - **Preflight**: start each required service (managed, then direct) and
//!   poll its health endpoint until ready or out of budget
//! - **Suites**: warmup iterations (discarded), then measured iterations via
//!   [`TimedOperationRunner`], with a [`sampler`] task per attached probe
//! - **Statistics**: min / max / mean / median per tracked metric
//! - **Report**: deterministic text (and optional JSON) with threshold-based
//!   recommendations

pub mod config;
pub mod error;
pub mod ops;
pub mod orchestrator;
pub mod probe;
pub mod readiness;
pub mod report;
pub mod runner;
pub mod sampler;
pub mod startup;
pub mod stats;
pub mod suites;
pub mod system_info;

pub use config::{BenchConfig, EnvOverrides};
pub use error::{BenchError, Result};
pub use orchestrator::{BenchmarkOrchestrator, RunState};
pub use report::BenchmarkReport;
pub use runner::{IterationResult, MetricValue, Operation, OperationError, TimedOperationRunner};
pub use suites::{Suite, SuiteFilter};
