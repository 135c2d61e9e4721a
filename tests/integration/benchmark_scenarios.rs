use crate::helpers::{
    AbsentGpuProbe, FakeOperation, FixedGpuProbe, fixed_system_info, quick_config,
};
use chrono::{DateTime, TimeZone, Utc};
use stackbench::BenchmarkOrchestrator;
use stackbench::probe::GPU_UTILIZATION_PCT;
use stackbench::report::SectionOutcome;
use stackbench::stats::{SuiteStatistics, Unit};
use stackbench::suites::{DURATION, Requirement, Suite, SuiteTag, TrackedMetric};
use std::sync::Arc;
use std::time::Duration;

fn frozen() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
}

fn stats<'a>(outcome: &'a SectionOutcome, metric: &str) -> &'a SuiteStatistics {
    match outcome {
        SectionOutcome::Completed { statistics, .. } => statistics
            .iter()
            .find(|s| s.metric_name == metric)
            .expect("metric tracked"),
        SectionOutcome::Skipped { reason } => panic!("suite skipped: {reason}"),
    }
}

fn resource_suite(op: Arc<FakeOperation>) -> Suite {
    Suite::new("inference", "Inference", op)
        .tagged(SuiteTag::Gpu)
        .with_probe(Arc::new(FixedGpuProbe(42.0)))
        .tracking(vec![
            TrackedMetric::duration(),
            TrackedMetric::peak(GPU_UTILIZATION_PCT, Unit::Percent),
        ])
}

#[tokio::test]
async fn three_measured_iterations_with_fixed_gpu_reading() {
    let op = Arc::new(FakeOperation::new(Duration::from_millis(100)));
    let suite = resource_suite(op.clone());
    let mut orchestrator = BenchmarkOrchestrator::new(quick_config(3, 1));

    let report = orchestrator
        .run(&[suite], fixed_system_info())
        .await
        .unwrap();

    assert_eq!(op.call_count(), 4, "one warmup plus three measured");
    let outcome = &report.sections[0].outcome;

    let duration = stats(outcome, DURATION);
    assert_eq!(duration.sample_count, 3);
    for value in [
        duration.min().unwrap(),
        duration.max().unwrap(),
        duration.mean().unwrap(),
    ] {
        assert!((value - 0.1).abs() < 0.05, "duration {value}");
    }

    let gpu = stats(outcome, GPU_UTILIZATION_PCT);
    assert_eq!(gpu.sample_count, 3);
    assert_eq!(gpu.min(), Some(42.0));
    assert_eq!(gpu.max(), Some(42.0));
    assert_eq!(gpu.mean(), Some(42.0));
    assert_eq!(gpu.median(), Some(42.0));
}

#[tokio::test]
async fn iteration_failing_twice_is_excluded() {
    // The third measured iteration is call 3; its retry is call 4.
    let op = Arc::new(FakeOperation::new(Duration::from_millis(5)).failing_on(&[3, 4]));
    let suite = Suite::new("endpoint-latency", "Endpoint Latency", op.clone());
    let mut orchestrator = BenchmarkOrchestrator::new(quick_config(5, 0));

    let report = orchestrator
        .run(&[suite], fixed_system_info())
        .await
        .unwrap();

    assert_eq!(op.call_count(), 6);
    let outcome = &report.sections[0].outcome;
    assert_eq!(stats(outcome, DURATION).sample_count, 4);
    assert!(matches!(
        outcome,
        SectionOutcome::Completed {
            failed_iterations: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn absent_gpu_tool_skips_optional_suite_and_run_completes() {
    let timed = Arc::new(FakeOperation::new(Duration::from_millis(5)));
    let gpu_op = Arc::new(FakeOperation::new(Duration::from_millis(5)));
    let suites = vec![
        Suite::new("inference", "Inference", timed.clone()),
        Suite::new("resource", "Resource Usage", gpu_op.clone())
            .tagged(SuiteTag::Gpu)
            .optional(true)
            .requires(Requirement::ProbeData)
            .with_probe(Arc::new(AbsentGpuProbe))
            .tracking(vec![TrackedMetric::peak(GPU_UTILIZATION_PCT, Unit::Percent)]),
    ];
    let mut orchestrator = BenchmarkOrchestrator::new(quick_config(2, 1));

    let report = orchestrator
        .run(&suites, fixed_system_info())
        .await
        .expect("a skipped optional suite is not a failure");

    assert_eq!(gpu_op.call_count(), 0);
    assert_eq!(timed.call_count(), 3);
    let resource = report.section("resource").unwrap();
    assert!(resource.is_skipped());
    let text = report.render();
    assert!(text.contains("## Resource Usage\n\nStatus: skipped"));
    assert!(text.contains("nvidia-smi not found"));
}

#[tokio::test]
async fn required_suite_with_absent_probe_records_no_data() {
    let op = Arc::new(FakeOperation::new(Duration::from_millis(20)));
    let suite = Suite::new("inference", "Inference", op)
        .with_probe(Arc::new(AbsentGpuProbe))
        .tracking(vec![
            TrackedMetric::duration(),
            TrackedMetric::peak(GPU_UTILIZATION_PCT, Unit::Percent),
        ]);
    let mut orchestrator = BenchmarkOrchestrator::new(quick_config(2, 0));

    let report = orchestrator
        .run(&[suite], fixed_system_info())
        .await
        .unwrap();

    let outcome = &report.sections[0].outcome;
    assert_eq!(stats(outcome, DURATION).sample_count, 2);
    let gpu = stats(outcome, GPU_UTILIZATION_PCT);
    assert!(!gpu.is_defined());
    assert_eq!(gpu.min(), None);
    assert!(report.render().contains("Min: no data"));
}

#[tokio::test]
async fn report_rendering_is_byte_identical_for_identical_input() {
    let op = Arc::new(FakeOperation::new(Duration::from_millis(5)));
    let mut orchestrator =
        BenchmarkOrchestrator::new(quick_config(2, 0)).with_clock(frozen);
    let report = orchestrator
        .run(&[resource_suite(op)], fixed_system_info())
        .await
        .unwrap();

    let first = report.render();
    let second = report.clone().render();
    assert_eq!(first, second);
    assert!(first.starts_with("# Benchmark Report\n\nGenerated: 2026-01-02T03:04:05Z\n"));
    assert!(first.contains("Hostname: bench-host"));
    assert!(first.contains("GPU: Test GPU 24GB"));
}

#[tokio::test]
async fn report_file_is_overwritten_each_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.md");
    std::fs::write(&path, "stale contents from a previous run\n".repeat(50)).unwrap();

    let op = Arc::new(FakeOperation::new(Duration::from_millis(5)));
    let mut orchestrator = BenchmarkOrchestrator::new(quick_config(1, 0)).with_clock(frozen);
    let report = orchestrator
        .run(&[Suite::new("inference", "Inference", op)], fixed_system_info())
        .await
        .unwrap();
    let text = report.render();
    stackbench::report::write_report(&text, Some(&path)).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
}
