//! Top-level benchmark coordinator.
//!
//! ```text
//! Idle → Preflight → Suite(0) → … → Suite(n-1) → Reporting → Done
//!            ↓           ↓
//!          Failed      Failed
//! ```
//!
//! Preflight checks local preconditions, starts (unless disabled) and gates
//! on every service the selected suites need. Any preflight failure is fatal
//! and no suite runs. Suites then run strictly one after another; within a
//! suite, warmup iterations are executed and discarded, and each failing
//! measured iteration is retried once before being excluded.

use crate::config::{BenchConfig, ReadinessConfig, StartupConfig};
use crate::error::{BenchError, Result};
use crate::probe::ProbeReading;
use crate::readiness::{ReadinessChecker, ServiceEndpoint};
use crate::report::{BenchmarkReport, SectionOutcome, SuiteSection};
use crate::runner::{IterationOutcome, IterationResult, TimedOperationRunner};
use crate::startup::{Launcher, ProcessLauncher, StartupPlan, ensure_started};
use crate::stats::suite_statistics;
use crate::suites::{MetricSource, Requirement, Service, Suite, TrackedMetric, required_services};
use crate::system_info::SystemInfo;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preflight,
    /// Running the suite at this index.
    Suite(usize),
    Reporting,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns `true` if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Idle, Self::Preflight)
            | (Self::Preflight, Self::Suite(0))
            | (Self::Preflight, Self::Reporting)
            | (Self::Preflight, Self::Failed)
            | (Self::Suite(_), Self::Reporting)
            | (Self::Suite(_), Self::Failed)
            | (Self::Reporting, Self::Done) => true,
            (Self::Suite(a), Self::Suite(b)) => b == a + 1,
            _ => false,
        }
    }
}

/// Runs suites against a configuration and produces the report.
pub struct BenchmarkOrchestrator {
    config: BenchConfig,
    checker: ReadinessChecker,
    launcher: Arc<dyn Launcher>,
    clock: fn() -> DateTime<Utc>,
    state: RunState,
}

impl BenchmarkOrchestrator {
    pub fn new(config: BenchConfig) -> Self {
        Self {
            config,
            checker: ReadinessChecker::default(),
            launcher: Arc::new(ProcessLauncher::default()),
            clock: Utc::now,
            state: RunState::Idle,
        }
    }

    /// Use `launcher` for service starts.
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_checker(mut self, checker: ReadinessChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Source of the report timestamp.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {next:?}",
            self.state
        );
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    /// Execute the whole run.
    ///
    /// # Errors
    ///
    /// Fatal errors from preflight (missing precondition, startup failure,
    /// readiness timeout) and [`BenchError::SuiteFailed`] for a required
    /// suite without a single successful iteration. No report is produced
    /// in either case.
    pub async fn run(
        &mut self,
        suites: &[Suite],
        system_info: SystemInfo,
    ) -> Result<BenchmarkReport> {
        self.transition(RunState::Preflight);
        if let Err(e) = self.preflight(suites).await {
            self.transition(RunState::Failed);
            return Err(e);
        }

        let mut sections = Vec::with_capacity(suites.len());
        for (index, suite) in suites.iter().enumerate() {
            self.transition(RunState::Suite(index));
            match self.run_suite(suite).await {
                Ok(section) => sections.push(section),
                Err(e) => {
                    self.transition(RunState::Failed);
                    return Err(e);
                }
            }
        }

        self.transition(RunState::Reporting);
        let run = &self.config.run;
        let report = BenchmarkReport::new(
            (self.clock)(),
            system_info,
            run.iterations,
            run.warmup,
            sections,
        );
        self.transition(RunState::Done);
        Ok(report)
    }

    async fn preflight(&self, suites: &[Suite]) -> Result<()> {
        for suite in suites.iter().filter(|s| !s.optional) {
            for requirement in &suite.requirements {
                if let Requirement::Program(program) = requirement
                    && which::which(program).is_err()
                {
                    return Err(BenchError::PreconditionMissing(format!(
                        "{program} not found on PATH (required by suite {})",
                        suite.name
                    )));
                }
            }
        }

        for service in required_services(suites) {
            let (endpoint, readiness, startup) = self.service_settings(service);
            let policy = readiness.policy();
            if self.config.run.skip_startup {
                debug!(service = %endpoint.name, "startup disabled, gating on readiness only");
            } else {
                let plan = StartupPlan::from(startup);
                let action = ensure_started(
                    &self.checker,
                    self.launcher.as_ref(),
                    &endpoint,
                    &plan,
                    policy.probe_timeout,
                )
                .await?;
                debug!(service = %endpoint.name, ?action, "startup");
            }

            let elapsed = self
                .checker
                .wait_until_ready(&endpoint, &policy)
                .await
                .into_result(&endpoint.name)?;
            info!(
                service = %endpoint.name,
                elapsed_ms = elapsed.as_millis() as u64,
                "service ready"
            );
        }
        Ok(())
    }

    fn service_settings(&self, service: Service) -> (ServiceEndpoint, &ReadinessConfig, &StartupConfig) {
        match service {
            Service::Inference => {
                let c = &self.config.inference;
                (c.endpoint(), &c.readiness, &c.startup)
            }
            Service::Tools => {
                let c = &self.config.tools;
                (c.endpoint(), &c.readiness, &c.startup)
            }
        }
    }

    /// `Some(reason)` when an optional suite cannot run here.
    async fn skip_reason(&self, suite: &Suite) -> Result<Option<String>> {
        for requirement in &suite.requirements {
            match requirement {
                Requirement::Program(program) => {
                    if which::which(program).is_ok() {
                        continue;
                    }
                    let missing = format!("{program} not found on PATH");
                    if suite.optional {
                        return Ok(Some(BenchError::ToolUnavailable(missing).to_string()));
                    }
                    return Err(BenchError::PreconditionMissing(missing));
                }
                Requirement::ProbeData => {
                    for probe in &suite.probes {
                        let ProbeReading::Unavailable { reason } = probe.read().await else {
                            continue;
                        };
                        let err = BenchError::SamplingUnavailable(format!("{}: {reason}", probe.name()));
                        if suite.optional {
                            return Ok(Some(err.to_string()));
                        }
                        warn!(suite = %suite.name, error = %err, "metrics will be recorded as no data");
                    }
                }
            }
        }
        Ok(None)
    }

    async fn run_suite(&self, suite: &Suite) -> Result<SuiteSection> {
        if let Some(reason) = self.skip_reason(suite).await? {
            warn!(suite = %suite.name, %reason, "suite skipped");
            return Ok(SuiteSection {
                name: suite.name.clone(),
                title: suite.title.clone(),
                outcome: SectionOutcome::Skipped { reason },
            });
        }

        let run = &self.config.run;
        let runner = TimedOperationRunner::new(run.sample_interval(), run.operation_timeout());
        info!(
            suite = %suite.name,
            warmup = run.warmup,
            iterations = run.iterations,
            "running suite"
        );

        let operation = suite.operation.as_ref();
        let mut measured: Vec<IterationResult> = Vec::new();
        let mut failed_iterations = 0u32;

        for k in 0..run.warmup + run.iterations {
            if k > 0 {
                self.pause().await;
            }
            if k < run.warmup {
                let result = runner.run(&suite.name, k, operation, &suite.probes).await;
                debug!(suite = %suite.name, warmup = k, ok = result.succeeded(), "warmup discarded");
                continue;
            }

            let index = k - run.warmup;
            let mut result = runner.run(&suite.name, index, operation, &suite.probes).await;
            if let IterationOutcome::Failed { error } = &result.outcome {
                warn!(suite = %suite.name, iteration = index, %error, "iteration failed, retrying once");
                self.pause().await;
                result = runner.run(&suite.name, index, operation, &suite.probes).await;
            }

            match &result.outcome {
                IterationOutcome::Succeeded => measured.push(result),
                IterationOutcome::Failed { error } => {
                    failed_iterations += 1;
                    warn!(
                        suite = %suite.name,
                        iteration = index,
                        error = %BenchError::OperationFailure(error.to_string()),
                        "iteration excluded from statistics"
                    );
                }
            }
        }

        if measured.is_empty() && !suite.optional {
            return Err(BenchError::SuiteFailed {
                suite: suite.name.clone(),
                reason: format!(
                    "all {} measured iteration(s) failed after one retry each",
                    run.iterations
                ),
            });
        }

        let statistics = suite
            .metrics
            .iter()
            .map(|metric| {
                let values = series(&measured, metric);
                suite_statistics(&suite.name, &metric.name, metric.unit, &values, 0)
            })
            .collect();
        info!(
            suite = %suite.name,
            measured = measured.len(),
            failed = failed_iterations,
            "suite complete"
        );

        Ok(SuiteSection {
            name: suite.name.clone(),
            title: suite.title.clone(),
            outcome: SectionOutcome::Completed {
                statistics,
                failed_iterations,
            },
        })
    }

    async fn pause(&self) {
        let pause = self.config.run.iteration_pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

/// Per-iteration values of `metric`; iterations without data are left out.
fn series(results: &[IterationResult], metric: &TrackedMetric) -> Vec<f64> {
    results
        .iter()
        .filter_map(|r| match &metric.source {
            MetricSource::Duration => Some(r.duration_secs),
            MetricSource::Peak(name) => r.peak(name),
        })
        .collect()
}
