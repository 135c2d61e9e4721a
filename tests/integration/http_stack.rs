//! Standard suites against mocked inference and tool servers.

use crate::helpers::{RecordingLauncher, fixed_system_info, quick_config};
use stackbench::config::BenchConfig;
use stackbench::readiness::ReadinessChecker;
use stackbench::report::SectionOutcome;
use stackbench::suites::{DURATION, standard_suites};
use stackbench::{BenchmarkOrchestrator, SuiteFilter};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn inference_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"models": [{"name": "llama3.2:3b"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({"keep_alive": 0})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "", "done": true})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"response": "A health check confirms liveness.", "done": true})),
        )
        .mount(&server)
        .await;
    server
}

async fn tool_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(
                    "event: message\ndata: {\"jsonrpc\":\"2.0\",\"result\":{\"tools\":[]},\"id\":1}\n\n",
                ),
        )
        .mount(&server)
        .await;
    server
}

fn config_for(inference: &MockServer, tools: &MockServer) -> BenchConfig {
    let mut config = quick_config(2, 1);
    config.inference.host = inference.address().ip().to_string();
    config.inference.port = inference.address().port();
    config.tools.host = tools.address().ip().to_string();
    config.tools.port = tools.address().port();
    config.gpu.program = "stackbench-no-such-gpu-tool".to_owned();
    config
}

fn sample_count(outcome: &SectionOutcome) -> usize {
    match outcome {
        SectionOutcome::Completed { statistics, .. } => statistics
            .iter()
            .find(|s| s.metric_name == DURATION)
            .map_or(0, |s| s.sample_count),
        SectionOutcome::Skipped { reason } => panic!("skipped: {reason}"),
    }
}

#[tokio::test]
async fn full_run_against_mocked_services() {
    let inference = inference_server().await;
    let tools = tool_server().await;
    let config = config_for(&inference, &tools);
    let client = reqwest::Client::new();
    let suites = SuiteFilter::default().apply(standard_suites(&config, client.clone()));

    let launcher = Arc::new(RecordingLauncher::default());
    let mut orchestrator = BenchmarkOrchestrator::new(config)
        .with_checker(ReadinessChecker::new(client))
        .with_launcher(launcher.clone());
    let report = orchestrator
        .run(&suites, fixed_system_info())
        .await
        .unwrap();

    assert!(launcher.calls().is_empty(), "healthy services are not started");
    let names: Vec<&str> = report.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["model-load", "inference", "resource", "endpoint-latency"]
    );
    assert_eq!(sample_count(&report.section("model-load").unwrap().outcome), 2);
    assert_eq!(sample_count(&report.section("inference").unwrap().outcome), 2);
    assert_eq!(
        sample_count(&report.section("endpoint-latency").unwrap().outcome),
        2
    );
    match &report.section("resource").unwrap().outcome {
        SectionOutcome::Skipped { reason } => {
            assert!(reason.starts_with("tool unavailable"), "{reason}");
            assert!(reason.contains("stackbench-no-such-gpu-tool"), "{reason}");
        }
        other => panic!("expected skipped resource suite, got {other:?}"),
    }

    let text = report.render();
    assert!(text.contains("## Model Loading"));
    assert!(text.contains("## Endpoint Latency"));
    assert!(text.contains("[good] Endpoint Latency"));
}

#[tokio::test]
async fn mcp_only_never_touches_inference_server() {
    let inference = MockServer::start().await;
    let tools = tool_server().await;
    let config = config_for(&inference, &tools);
    let client = reqwest::Client::new();
    let filter = SuiteFilter {
        gpu_only: false,
        mcp_only: true,
    };
    let suites = filter.apply(standard_suites(&config, client.clone()));

    let mut orchestrator =
        BenchmarkOrchestrator::new(config).with_checker(ReadinessChecker::new(client));
    let report = orchestrator
        .run(&suites, fixed_system_info())
        .await
        .unwrap();

    assert_eq!(report.sections.len(), 1);
    assert_eq!(
        inference.received_requests().await.unwrap_or_default().len(),
        0
    );
}

#[tokio::test]
async fn rejected_token_fails_the_endpoint_suite() {
    let inference = MockServer::start().await;
    let tools = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&tools)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .mount(&tools)
        .await;

    let config = config_for(&inference, &tools);
    let client = reqwest::Client::new();
    let filter = SuiteFilter {
        gpu_only: false,
        mcp_only: true,
    };
    let suites = filter.apply(standard_suites(&config, client.clone()));

    let err = BenchmarkOrchestrator::new(config)
        .with_checker(ReadinessChecker::new(client))
        .run(&suites, fixed_system_info())
        .await
        .unwrap_err();
    assert!(
        matches!(err, stackbench::BenchError::SuiteFailed { ref suite, .. } if suite == "endpoint-latency"),
        "{err}"
    );
}
