use crate::helpers::{FakeOperation, RecordingLauncher, fixed_system_info, quick_config};
use stackbench::config::{BenchConfig, ReadinessConfig};
use stackbench::suites::{Service, Suite};
use stackbench::{BenchError, BenchmarkOrchestrator, RunState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn point_inference_at(config: &mut BenchConfig, server: &MockServer) {
    config.inference.host = server.address().ip().to_string();
    config.inference.port = server.address().port();
}

fn fast_readiness(max_attempts: u32) -> ReadinessConfig {
    ReadinessConfig {
        max_attempts,
        interval_ms: 50,
        timeout_secs: 1,
        probe_timeout_secs: 1,
    }
}

#[tokio::test]
async fn readiness_timeout_is_fatal_and_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = quick_config(3, 1);
    point_inference_at(&mut config, &server);
    config.inference.readiness = fast_readiness(1_000);
    config.run.skip_startup = true;

    let op = Arc::new(FakeOperation::new(Duration::from_millis(1)));
    let suite = Suite::new("inference", "Inference", op.clone()).needs(Service::Inference);
    let mut orchestrator = BenchmarkOrchestrator::new(config);

    let started = Instant::now();
    let err = orchestrator
        .run(&[suite], fixed_system_info())
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(matches!(err, BenchError::ReadinessTimeout { .. }), "{err}");
    assert_eq!(err.exit_code(), 1);
    assert_eq!(op.call_count(), 0, "no suite runs after a failed gate");
    assert_eq!(orchestrator.state(), RunState::Failed);
}

#[tokio::test]
async fn refused_connections_are_unreachable() {
    let mut config = quick_config(1, 0);
    config.inference.host = "127.0.0.1".to_owned();
    config.inference.port = 19_993;
    config.inference.readiness = fast_readiness(3);
    config.run.skip_startup = true;

    let suite = Suite::new(
        "inference",
        "Inference",
        Arc::new(FakeOperation::new(Duration::from_millis(1))),
    )
    .needs(Service::Inference);
    let err = BenchmarkOrchestrator::new(config)
        .run(&[suite], fixed_system_info())
        .await
        .unwrap_err();

    match err {
        BenchError::Unreachable { service, attempts, .. } => {
            assert_eq!(service, "inference");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected Unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn both_start_attempts_failing_stops_before_readiness() {
    let mut config = quick_config(1, 0);
    config.inference.host = "127.0.0.1".to_owned();
    config.inference.port = 19_992;
    config.inference.readiness = fast_readiness(1_000);

    let launcher = Arc::new(RecordingLauncher::default());
    let suite = Suite::new(
        "inference",
        "Inference",
        Arc::new(FakeOperation::new(Duration::from_millis(1))),
    )
    .needs(Service::Inference);
    let mut orchestrator = BenchmarkOrchestrator::new(config).with_launcher(launcher.clone());

    let err = orchestrator
        .run(&[suite], fixed_system_info())
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::StartupFailed { .. }), "{err}");
    assert_eq!(
        launcher.calls(),
        vec![
            "managed: systemctl start ollama".to_owned(),
            "direct: ollama serve".to_owned()
        ]
    );
}

#[tokio::test]
async fn healthy_service_is_not_restarted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = quick_config(1, 0);
    point_inference_at(&mut config, &server);
    config.inference.readiness = fast_readiness(5);

    let launcher = Arc::new(RecordingLauncher::default());
    let op = Arc::new(FakeOperation::new(Duration::from_millis(1)));
    let suite = Suite::new("inference", "Inference", op.clone()).needs(Service::Inference);
    let mut orchestrator = BenchmarkOrchestrator::new(config).with_launcher(launcher.clone());

    orchestrator
        .run(&[suite], fixed_system_info())
        .await
        .unwrap();
    assert!(launcher.calls().is_empty());
    assert_eq!(op.call_count(), 1);
    assert_eq!(orchestrator.state(), RunState::Done);
}

#[tokio::test]
async fn managed_start_then_readiness_gate() {
    let server = MockServer::start().await;
    // Down for the startup check, then healthy.
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = quick_config(1, 0);
    point_inference_at(&mut config, &server);
    config.inference.readiness = fast_readiness(5);

    let launcher = Arc::new(RecordingLauncher {
        managed_ok: true,
        ..RecordingLauncher::default()
    });
    let suite = Suite::new(
        "inference",
        "Inference",
        Arc::new(FakeOperation::new(Duration::from_millis(1))),
    )
    .needs(Service::Inference);
    let mut orchestrator = BenchmarkOrchestrator::new(config).with_launcher(launcher.clone());

    orchestrator
        .run(&[suite], fixed_system_info())
        .await
        .unwrap();
    assert_eq!(
        launcher.calls(),
        vec!["managed: systemctl start ollama".to_owned()]
    );
}
