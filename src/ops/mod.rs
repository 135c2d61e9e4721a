//! Concrete operations timed by the benchmark suites.
//!
//! - [`inference`]: non-streaming generation and cold model loads against the
//!   inference server
//! - [`mcp`]: JSON-RPC calls against the tool server
//! - [`command`]: local CLI invocations

pub mod command;
pub mod inference;
pub mod mcp;

pub use command::CommandOperation;
pub use inference::{GenerateOperation, ModelLoadOperation};
pub use mcp::JsonRpcOperation;

use crate::runner::OperationError;

/// Map a reqwest error onto an [`OperationError`].
pub(crate) fn classify_reqwest_error(err: &reqwest::Error) -> OperationError {
    if err.is_decode() {
        OperationError::protocol(err.to_string())
    } else {
        OperationError::transport(err.to_string())
    }
}

/// Turn a non-2xx response into [`OperationError::Status`], truncating the body.
pub(crate) async fn error_for_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, OperationError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(OperationError::Status {
        status_code: status.as_u16(),
        message: body.chars().take(300).collect(),
    })
}
