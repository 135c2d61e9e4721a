//! Service readiness checks.
//!
//! [`ReadinessChecker::wait_until_ready`] polls a service's health path until
//! it answers with a 2xx status, the attempt budget runs out, or the overall
//! deadline passes. The deadline is always enforced: every probe request is
//! capped by the time remaining.
//!
//! # Outcomes
//!
//! - [`Ready`](ReadinessOutcome::Ready): a probe returned 2xx
//! - [`TimedOut`](ReadinessOutcome::TimedOut): the deadline passed, or the
//!   attempt budget ran out after the service answered at least once
//! - [`Unreachable`](ReadinessOutcome::Unreachable): the attempt budget ran
//!   out and every probe failed at transport level

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// A collaborator service reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub base_url: String,
    pub health_path: String,
}

impl ServiceEndpoint {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        health_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            health_path: health_path.into(),
        }
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn health_url(&self) -> String {
        self.url(&self.health_path)
    }
}

/// Bounds for one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of health probes.
    pub max_attempts: u32,
    /// Pause between probes.
    pub interval: Duration,
    /// Hard wall-clock bound for the whole wait.
    pub total_timeout: Duration,
    /// Upper bound for a single probe request.
    pub probe_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
            total_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// State of a service after one health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 2xx response.
    Healthy,
    /// Responded with a non-2xx status.
    Unhealthy { status_code: u16 },
    /// Connection refused / DNS / other transport failure.
    NotRunning { detail: String },
    /// No response within the probe timeout.
    Timeout,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    fn is_transport_failure(&self) -> bool {
        matches!(self, Self::NotRunning { .. } | Self::Timeout)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy { status_code } => write!(f, "unhealthy (HTTP {status_code})"),
            Self::NotRunning { detail } => write!(f, "not running ({detail})"),
            Self::Timeout => write!(f, "timeout (no response)"),
        }
    }
}

/// Final result of a readiness wait.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadinessOutcome {
    Ready { attempts: u32, elapsed: Duration },
    TimedOut { attempts: u32, elapsed: Duration },
    Unreachable { attempts: u32, last_error: String },
}

impl ReadinessOutcome {
    /// Convert a non-ready outcome into the matching fatal error.
    pub fn into_result(self, service: &str) -> Result<Duration, BenchError> {
        match self {
            Self::Ready { elapsed, .. } => Ok(elapsed),
            Self::TimedOut { attempts, elapsed } => Err(BenchError::ReadinessTimeout {
                service: service.to_owned(),
                attempts,
                elapsed_secs: elapsed.as_secs_f64(),
            }),
            Self::Unreachable {
                attempts,
                last_error,
            } => Err(BenchError::Unreachable {
                service: service.to_owned(),
                attempts,
                last_error,
            }),
        }
    }
}

/// Polls health endpoints. Holds no per-service state.
#[derive(Debug, Clone, Default)]
pub struct ReadinessChecker {
    client: reqwest::Client,
}

impl ReadinessChecker {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Send a single health probe.
    pub async fn check_once(&self, endpoint: &ServiceEndpoint, timeout: Duration) -> HealthStatus {
        let request = self.client.get(endpoint.health_url()).timeout(timeout);
        match request.send().await {
            Ok(resp) if resp.status().is_success() => HealthStatus::Healthy,
            Ok(resp) => HealthStatus::Unhealthy {
                status_code: resp.status().as_u16(),
            },
            Err(e) => classify_reqwest_error(&e),
        }
    }

    /// Poll until healthy, out of attempts, or past `policy.total_timeout`.
    pub async fn wait_until_ready(
        &self,
        endpoint: &ServiceEndpoint,
        policy: &RetryPolicy,
    ) -> ReadinessOutcome {
        let start = Instant::now();
        let deadline = start + policy.total_timeout;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut only_transport_failures = true;
        let mut last_error = String::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ReadinessOutcome::TimedOut {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }

            attempts += 1;
            let status = self
                .check_once(endpoint, policy.probe_timeout.min(remaining))
                .await;
            debug!(
                service = %endpoint.name,
                attempt = attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                %status,
                "readiness probe"
            );

            if status.is_healthy() {
                return ReadinessOutcome::Ready {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }
            if !status.is_transport_failure() {
                only_transport_failures = false;
            }
            last_error = status.to_string();

            if attempts >= max_attempts {
                return if only_transport_failures {
                    ReadinessOutcome::Unreachable {
                        attempts,
                        last_error,
                    }
                } else {
                    ReadinessOutcome::TimedOut {
                        attempts,
                        elapsed: start.elapsed(),
                    }
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(policy.interval.min(remaining)).await;
        }
    }
}

/// Classify a reqwest error into a [`HealthStatus`].
fn classify_reqwest_error(err: &reqwest::Error) -> HealthStatus {
    if err.is_timeout() {
        HealthStatus::Timeout
    } else {
        HealthStatus::NotRunning {
            detail: err.to_string(),
        }
    }
}
