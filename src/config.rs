//! Configuration for a benchmark run.
//!
//! A [`BenchConfig`] is built once at startup from built-in defaults, an
//! optional TOML file, environment overrides ([`EnvOverrides`]) and CLI
//! flags, then passed by reference to every component. Nothing else in the
//! crate reads the process environment.

use crate::error::{BenchError, Result};
use crate::readiness::{RetryPolicy, ServiceEndpoint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the tool-server bearer token (required).
pub const ENV_AUTH_TOKEN: &str = "MCP_AUTH_TOKEN";
/// Inference server host override: `host`, `host:port` or `scheme://host[:port]`.
pub const ENV_INFERENCE_HOST: &str = "OLLAMA_HOST";
/// Inference server port override.
pub const ENV_INFERENCE_PORT: &str = "OLLAMA_PORT";
/// Tool server host override.
pub const ENV_TOOLS_HOST: &str = "MCP_HOST";
/// Tool server port override.
pub const ENV_TOOLS_PORT: &str = "MCP_PORT";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Iteration counts, pacing and output.
    pub run: RunConfig,
    /// Local inference server.
    pub inference: InferenceConfig,
    /// Automation-tool (MCP) server.
    pub tools: ToolServerConfig,
    /// GPU probe tool.
    pub gpu: GpuConfig,
    /// Extra timed CLI suites.
    pub command_suites: Vec<CommandSuiteConfig>,
}

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Measured iterations per suite.
    pub iterations: u32,
    /// Warmup iterations per suite (executed, never measured).
    pub warmup: u32,
    /// Pause between consecutive iterations in milliseconds.
    pub iteration_pause_ms: u64,
    /// Timeout for a single operation call in seconds.
    pub operation_timeout_secs: u64,
    /// Resource sampler tick in milliseconds.
    pub sample_interval_ms: u64,
    /// Write the report here instead of stdout.
    pub output: Option<PathBuf>,
    /// Also write `<output>.json` next to the text report.
    pub json: bool,
    /// Do not try to start services; only gate on readiness.
    pub skip_startup: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            warmup: 1,
            iteration_pause_ms: 1_000,
            operation_timeout_secs: 120,
            sample_interval_ms: 200,
            output: None,
            json: false,
            skip_startup: false,
        }
    }
}

impl RunConfig {
    pub fn iteration_pause(&self) -> Duration {
        Duration::from_millis(self.iteration_pause_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Readiness polling policy as written in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Maximum number of health probes.
    pub max_attempts: u32,
    /// Pause between probes in milliseconds.
    pub interval_ms: u64,
    /// Overall deadline in seconds.
    pub timeout_secs: u64,
    /// Timeout for one probe request in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval_ms: 2_000,
            timeout_secs: 60,
            probe_timeout_secs: 5,
        }
    }
}

impl ReadinessConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            interval: Duration::from_millis(self.interval_ms),
            total_timeout: Duration::from_secs(self.timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }
}

/// Commands used to bring a service up.
///
/// Each command is an argv vector; an empty vector means "not configured".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Service-manager start, run to completion (e.g. `systemctl start ollama`).
    pub managed: Vec<String>,
    /// Direct start, spawned and left running in the background.
    pub direct: Vec<String>,
}

/// Local inference server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Host name or address, optionally with a scheme.
    pub host: String,
    /// TCP port the server listens on.
    pub port: u16,
    /// Readiness / model-listing path.
    pub health_path: String,
    /// Non-streaming generation path.
    pub generate_path: String,
    /// Model to load and query.
    pub model: String,
    /// Prompt used by the inference suites.
    pub prompt: String,
    pub readiness: ReadinessConfig,
    pub startup: StartupConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 11434,
            health_path: "/api/tags".to_owned(),
            generate_path: "/api/generate".to_owned(),
            model: "llama3.2:3b".to_owned(),
            prompt: "Summarize the purpose of a health check in one sentence.".to_owned(),
            readiness: ReadinessConfig::default(),
            startup: StartupConfig {
                managed: vec!["systemctl".to_owned(), "start".to_owned(), "ollama".to_owned()],
                direct: vec!["ollama".to_owned(), "serve".to_owned()],
            },
        }
    }
}

impl InferenceConfig {
    pub fn base_url(&self) -> String {
        base_url(&self.host, self.port)
    }

    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::new("inference", self.base_url(), &self.health_path)
    }
}

/// Automation-tool server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServerConfig {
    /// Host name or address, optionally with a scheme.
    pub host: String,
    /// TCP port the server listens on.
    pub port: u16,
    /// Readiness path.
    pub health_path: String,
    /// JSON-RPC endpoint path.
    pub rpc_path: String,
    /// JSON-RPC method timed by the endpoint-latency suite.
    pub rpc_method: String,
    /// Bearer token; only ever set from the environment.
    #[serde(skip)]
    pub auth_token: Option<String>,
    pub readiness: ReadinessConfig,
    pub startup: StartupConfig,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 3000,
            health_path: "/health".to_owned(),
            rpc_path: "/mcp".to_owned(),
            rpc_method: "tools/list".to_owned(),
            auth_token: None,
            readiness: ReadinessConfig::default(),
            startup: StartupConfig {
                managed: vec![
                    "docker".to_owned(),
                    "start".to_owned(),
                    "n8n-mcp".to_owned(),
                ],
                direct: Vec::new(),
            },
        }
    }
}

impl ToolServerConfig {
    pub fn base_url(&self) -> String {
        base_url(&self.host, self.port)
    }

    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::new("tools", self.base_url(), &self.health_path)
    }
}

/// GPU probe tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// Probe program, looked up on `PATH`.
    pub program: String,
    /// Timeout for one probe invocation in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            program: "nvidia-smi".to_owned(),
            probe_timeout_ms: 2_000,
        }
    }
}

/// A timed CLI suite declared in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSuiteConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Skip instead of failing when `program` is not installed.
    #[serde(default)]
    pub optional: bool,
}

/// Environment-derived overrides, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// [`ENV_AUTH_TOKEN`]
    pub auth_token: Option<String>,
    /// [`ENV_INFERENCE_HOST`]
    pub inference_host: Option<String>,
    /// [`ENV_INFERENCE_PORT`]
    pub inference_port: Option<String>,
    /// [`ENV_TOOLS_HOST`]
    pub tools_host: Option<String>,
    /// [`ENV_TOOLS_PORT`]
    pub tools_port: Option<String>,
}

impl EnvOverrides {
    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build overrides from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            auth_token: get(ENV_AUTH_TOKEN),
            inference_host: get(ENV_INFERENCE_HOST),
            inference_port: get(ENV_INFERENCE_PORT),
            tools_host: get(ENV_TOOLS_HOST),
            tools_port: get(ENV_TOOLS_PORT),
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BenchError::Config(e.to_string()))
    }

    /// Load from `explicit` if given, else from the default path if it exists,
    /// else fall back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Returns the default config file path: `<config_dir>/stackbench/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stackbench").join("config.toml"))
    }

    /// Apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::PreconditionMissing`] when the auth token is absent
    /// and [`BenchError::Config`] when a host or port override does not parse.
    ///
    /// A port carried by a host override is used unless the matching port
    /// variable is also set.
    pub fn apply_env(&mut self, env: &EnvOverrides) -> Result<()> {
        let token = env.auth_token.clone().ok_or_else(|| {
            BenchError::PreconditionMissing(format!("{ENV_AUTH_TOKEN} is not set"))
        })?;
        self.tools.auth_token = Some(token);

        if let Some(value) = &env.inference_host {
            let (host, port) = parse_host(ENV_INFERENCE_HOST, value)?;
            self.inference.host = host;
            if let Some(port) = port {
                self.inference.port = port;
            }
        }
        if let Some(port) = &env.inference_port {
            self.inference.port = parse_port(ENV_INFERENCE_PORT, port)?;
        }
        if let Some(value) = &env.tools_host {
            let (host, port) = parse_host(ENV_TOOLS_HOST, value)?;
            self.tools.host = host;
            if let Some(port) = port {
                self.tools.port = port;
            }
        }
        if let Some(port) = &env.tools_port {
            self.tools.port = parse_port(ENV_TOOLS_PORT, port)?;
        }
        Ok(())
    }

    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.run.iterations == 0 {
            return Err(BenchError::Config(
                "iterations must be greater than zero".to_owned(),
            ));
        }
        if self.run.sample_interval_ms == 0 {
            return Err(BenchError::Config(
                "sample_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.run.operation_timeout_secs == 0 {
            return Err(BenchError::Config(
                "operation_timeout_secs must be greater than zero".to_owned(),
            ));
        }
        for readiness in [&self.inference.readiness, &self.tools.readiness] {
            if readiness.timeout_secs == 0 || readiness.max_attempts == 0 {
                return Err(BenchError::Config(
                    "readiness timeout_secs and max_attempts must be greater than zero".to_owned(),
                ));
            }
        }
        for suite in &self.command_suites {
            if suite.name.trim().is_empty() || suite.program.trim().is_empty() {
                return Err(BenchError::Config(
                    "command suites need a name and a program".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_port(var: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| BenchError::Config(format!("{var}={value:?} is not a valid port: {e}")))
}

/// Split a host override into `scheme://host` and its explicit port, if any.
fn parse_host(var: &str, value: &str) -> Result<(String, Option<u16>)> {
    let value = value.trim().trim_end_matches('/');
    let with_scheme = if value.contains("://") {
        value.to_owned()
    } else {
        format!("http://{value}")
    };
    let invalid = |reason: &str| BenchError::Config(format!("{var}={value:?} is not a valid host: {reason}"));
    let url = reqwest::Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("no host"))?;

    // Url drops a port equal to the scheme default, so look at the authority.
    let authority = with_scheme
        .split_once("://")
        .map_or("", |(_, rest)| rest.split('/').next().unwrap_or(rest));
    let explicit_port = authority
        .rsplit_once(':')
        .is_some_and(|(_, p)| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    let port = if explicit_port {
        url.port_or_known_default()
    } else {
        None
    };
    Ok((format!("{}://{host}", url.scheme()), port))
}

/// `host` may already carry a scheme (`OLLAMA_HOST=http://gpu-box`).
fn base_url(host: &str, port: u16) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        format!("{host}:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}
