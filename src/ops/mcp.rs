//! JSON-RPC 2.0 calls against the tool server.
//!
//! Requests are POSTed as a single JSON object:
//!
//! ```json
//! {"jsonrpc":"2.0","method":"tools/list","params":{},"id":1}
//! ```
//!
//! The server answers either with a plain JSON body or, for streamable HTTP
//! transports, with SSE framing:
//!
//! ```text
//! event: message
//! data: {"jsonrpc":"2.0","result":{"tools":[]},"id":1}
//! ```
//!
//! In the SSE case the last `data:` frame holding a JSON object is used.

use super::{classify_reqwest_error, error_for_status};
use crate::runner::{Operation, OperationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.to_owned(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// A JSON-RPC 2.0 response: exactly one of `result` / `error` is expected.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Collapse into the call outcome.
    pub fn into_result(self) -> Result<serde_json::Value, OperationError> {
        if let Some(error) = self.error {
            return Err(OperationError::protocol(format!(
                "remote error {}: {}",
                error.code, error.message
            )));
        }
        self.result
            .ok_or_else(|| OperationError::protocol("response has neither result nor error"))
    }
}

/// Extract the JSON-RPC payload from a plain or SSE-framed body.
pub fn parse_rpc_body(body: &str) -> Result<JsonRpcResponse, OperationError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| OperationError::protocol(format!("invalid JSON-RPC body: {e}")));
    }

    let payload = body
        .lines()
        .rev()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .find(|data| data.starts_with('{'))
        .ok_or_else(|| OperationError::protocol("no JSON data frame in event stream"))?;
    serde_json::from_str(payload)
        .map_err(|e| OperationError::protocol(format!("invalid JSON-RPC frame: {e}")))
}

/// One JSON-RPC call with bearer authentication.
#[derive(Debug)]
pub struct JsonRpcOperation {
    client: reqwest::Client,
    url: String,
    method: String,
    auth_token: String,
    next_id: AtomicU64,
}

impl JsonRpcOperation {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        method: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            method: method.into(),
            auth_token: auth_token.into(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Operation for JsonRpcOperation {
    fn name(&self) -> &str {
        &self.method
    }

    async fn invoke(&self) -> Result<(), OperationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(&self.method, serde_json::json!({}), id);
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.auth_token)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let resp = error_for_status(resp).await?;
        let body = resp.text().await.map_err(|e| classify_reqwest_error(&e))?;
        parse_rpc_body(&body)?.into_result().map(|_| ())
    }
}
