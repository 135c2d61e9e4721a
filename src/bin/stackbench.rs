//! stackbench CLI.
//!
//! Starts and gates the inference and tool servers, runs the benchmark
//! suites and prints the report to stdout (or `--output FILE`). All tracing
//! goes to stderr so stdout stays the report stream.
//!
//! Exit codes: `0` on a completed run (skipped suites included), `1` on any
//! fatal precondition, startup, readiness or suite failure.

use clap::Parser;
use stackbench::readiness::ReadinessChecker;
use stackbench::report::{write_json, write_report};
use stackbench::suites::{gpu_probe, standard_suites};
use stackbench::system_info::SystemInfo;
use stackbench::{BenchConfig, BenchError, BenchmarkOrchestrator, EnvOverrides, SuiteFilter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Benchmark a local inference server and an MCP tool server.
#[derive(Parser)]
#[command(name = "stackbench", version, about)]
struct Cli {
    /// Measured iterations per suite.
    #[arg(long, value_name = "N")]
    iterations: Option<u32>,

    /// Warmup iterations per suite (executed, not measured).
    #[arg(long, value_name = "N")]
    warmup: Option<u32>,

    /// Write the report to FILE instead of stdout (overwrites).
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Run only GPU-tagged suites. Combined with --mcp-only, runs both sets.
    #[arg(long)]
    gpu_only: bool,

    /// Run only MCP-tagged suites. Combined with --gpu-only, runs both sets.
    #[arg(long)]
    mcp_only: bool,

    /// Verbose logging (per-attempt readiness probes, per-iteration timings).
    #[arg(long)]
    debug: bool,

    /// Path to TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not start services; only wait for them to become ready.
    #[arg(long)]
    skip_startup: bool,

    /// Also write the report as JSON to FILE.json (requires --output).
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "stackbench=debug"
    } else {
        "stackbench=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stackbench: {e:#}");
            let code = e
                .downcast_ref::<BenchError>()
                .map_or(1, BenchError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
    let filter = SuiteFilter {
        gpu_only: cli.gpu_only,
        mcp_only: cli.mcp_only,
    };
    let suites = filter.apply(standard_suites(&config, client.clone()));
    info!(
        suites = ?suites.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        iterations = config.run.iterations,
        warmup = config.run.warmup,
        "stackbench starting"
    );

    let system_info = SystemInfo::detect(&gpu_probe(&config), &config.inference.model).await;
    let output = config.run.output.clone();
    let json = config.run.json;

    let mut orchestrator =
        BenchmarkOrchestrator::new(config).with_checker(ReadinessChecker::new(client));
    let report = orchestrator.run(&suites, system_info).await?;

    write_report(&report.render(), output.as_deref())?;
    match (&output, json) {
        (Some(path), true) => {
            let json_path = write_json(&report, path)?;
            info!(path = %json_path.display(), "JSON report written");
        }
        (None, true) => warn!("--json needs --output; JSON report not written"),
        _ => {}
    }
    if let Some(path) = &output {
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

/// Defaults → TOML → environment → CLI flags.
fn build_config(cli: &Cli) -> stackbench::Result<BenchConfig> {
    let mut config = BenchConfig::load(cli.config.as_deref())?;
    config.apply_env(&EnvOverrides::from_env())?;

    if let Some(iterations) = cli.iterations {
        config.run.iterations = iterations;
    }
    if let Some(warmup) = cli.warmup {
        config.run.warmup = warmup;
    }
    if let Some(output) = &cli.output {
        config.run.output = Some(output.clone());
    }
    config.run.json |= cli.json;
    config.run.skip_startup |= cli.skip_startup;

    config.validate()?;
    Ok(config)
}
