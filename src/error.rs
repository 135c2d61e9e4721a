//! Error types for the benchmark run.

/// Top-level error type for a benchmark run.
///
/// Fatal kinds abort the run before any report is produced. The non-fatal
/// kinds are absorbed at suite or iteration level and only surface as
/// `skipped` / `no data` markers in the report.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// A required tool or environment variable is absent.
    #[error("precondition missing: {0}")]
    PreconditionMissing(String),

    /// A required collaborator never reported healthy within its deadline.
    #[error("{service} not ready after {elapsed_secs:.1}s ({attempts} attempt(s))")]
    ReadinessTimeout {
        /// Service name.
        service: String,
        /// Number of health probes sent.
        attempts: u32,
        /// Wall-clock time spent polling.
        elapsed_secs: f64,
    },

    /// Every readiness probe failed at transport level.
    #[error("{service} unreachable after {attempts} attempt(s): {last_error}")]
    Unreachable {
        /// Service name.
        service: String,
        /// Number of health probes sent.
        attempts: u32,
        /// Transport error from the final attempt.
        last_error: String,
    },

    /// Neither the managed nor the direct start succeeded.
    #[error("failed to start {service}: {reason}")]
    StartupFailed {
        /// Service name.
        service: String,
        /// Combined reason from both start attempts.
        reason: String,
    },

    /// An optional probe tool is not installed.
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    /// A single operation call failed.
    #[error("operation failed: {0}")]
    OperationFailure(String),

    /// A metric probe returned no data.
    #[error("sampling unavailable: {0}")]
    SamplingUnavailable(String),

    /// A required suite produced no successful iteration.
    #[error("suite {suite} failed: {reason}")]
    SuiteFailed {
        /// Suite name.
        suite: String,
        /// Why the suite is considered failed.
        reason: String,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Report rendering or serialization error.
    #[error("report error: {0}")]
    Report(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Returns `true` for kinds that abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ToolUnavailable(_) | Self::OperationFailure(_) | Self::SamplingUnavailable(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() { 1 } else { 0 }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BenchError>;
