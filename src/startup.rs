//! Two-tier service startup.
//!
//! Before a service is gated on readiness, [`ensure_started`] makes sure it
//! has been asked to run:
//!
//! 1. If it already answers its health probe, nothing is started.
//! 2. Otherwise the managed start (a service manager command) is tried.
//! 3. If that fails, the direct start spawns the server in the background.
//! 4. If both fail the run stops with [`BenchError::StartupFailed`].
//!
//! Starting is not waiting: readiness polling happens afterwards.

use crate::config::StartupConfig;
use crate::error::{BenchError, Result};
use crate::readiness::{ReadinessChecker, ServiceEndpoint};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// An argv-style command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    /// Build from an argv vector; `None` when empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a service can be started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupPlan {
    pub managed: Option<LaunchCommand>,
    pub direct: Option<LaunchCommand>,
}

impl From<&StartupConfig> for StartupPlan {
    fn from(config: &StartupConfig) -> Self {
        Self {
            managed: LaunchCommand::from_argv(&config.managed),
            direct: LaunchCommand::from_argv(&config.direct),
        }
    }
}

/// What [`ensure_started`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupAction {
    AlreadyRunning,
    StartedManaged,
    StartedDirect,
}

/// Executes start commands. Abstracted so tests never touch real services.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run a service-manager command to completion.
    async fn run_managed(&self, command: &LaunchCommand) -> std::result::Result<(), String>;

    /// Spawn a server process and leave it running.
    async fn spawn_direct(&self, command: &LaunchCommand) -> std::result::Result<(), String>;
}

/// [`Launcher`] backed by real child processes.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    /// Bound for the managed command.
    pub managed_timeout: Duration,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self {
            managed_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn run_managed(&self, command: &LaunchCommand) -> std::result::Result<(), String> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(self.managed_timeout, output).await {
            Ok(Ok(out)) if out.status.success() => Ok(()),
            Ok(Ok(out)) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Err(format!(
                    "`{command}` exited with {}: {}",
                    out.status,
                    stderr.trim().chars().take(300).collect::<String>()
                ))
            }
            Ok(Err(e)) => Err(format!("`{command}` could not be run: {e}")),
            Err(_) => Err(format!(
                "`{command}` timed out after {}s",
                self.managed_timeout.as_secs()
            )),
        }
    }

    async fn spawn_direct(&self, command: &LaunchCommand) -> std::result::Result<(), String> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("`{command}` could not be spawned: {e}"))?;

        // A server that exits immediately did not start.
        tokio::time::sleep(Duration::from_millis(200)).await;
        match child.try_wait() {
            Ok(Some(status)) => Err(format!("`{command}` exited immediately with {status}")),
            Ok(None) => Ok(()),
            Err(e) => Err(format!("`{command}` could not be polled: {e}")),
        }
    }
}

/// Make sure `endpoint` is running or has been asked to start.
///
/// # Errors
///
/// Returns [`BenchError::StartupFailed`] when the service is down and no
/// configured start command succeeded.
pub async fn ensure_started(
    checker: &ReadinessChecker,
    launcher: &dyn Launcher,
    endpoint: &ServiceEndpoint,
    plan: &StartupPlan,
    probe_timeout: Duration,
) -> Result<StartupAction> {
    let status = checker.check_once(endpoint, probe_timeout).await;
    if status.is_healthy() {
        info!(service = %endpoint.name, "already running, skipping start");
        return Ok(StartupAction::AlreadyRunning);
    }

    let mut failures = Vec::new();

    if let Some(command) = &plan.managed {
        info!(service = %endpoint.name, %command, "starting via service manager");
        match launcher.run_managed(command).await {
            Ok(()) => return Ok(StartupAction::StartedManaged),
            Err(reason) => {
                warn!(service = %endpoint.name, %reason, "managed start failed");
                failures.push(format!("managed: {reason}"));
            }
        }
    }

    if let Some(command) = &plan.direct {
        info!(service = %endpoint.name, %command, "starting directly in background");
        match launcher.spawn_direct(command).await {
            Ok(()) => return Ok(StartupAction::StartedDirect),
            Err(reason) => {
                warn!(service = %endpoint.name, %reason, "direct start failed");
                failures.push(format!("direct: {reason}"));
            }
        }
    }

    if failures.is_empty() {
        failures.push(format!("no start command configured ({status})"));
    }
    Err(BenchError::StartupFailed {
        service: endpoint.name.clone(),
        reason: failures.join("; "),
    })
}
