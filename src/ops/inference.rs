//! Operations against the local inference server.
//!
//! Both operations use the non-streaming generate endpoint:
//!
//! ```json
//! {"model": "llama3.2:3b", "prompt": "...", "stream": false}
//! ```
//!
//! and expect a JSON body carrying a `response` field.

use super::{classify_reqwest_error, error_for_status};
use crate::runner::{Operation, OperationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request body for the generate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    /// `0` unloads the model right after the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<u64>,
}

/// The part of the generate response the benchmark relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// Generated text; empty for a load-only call.
    pub response: String,
}

/// Shared HTTP plumbing for generate calls.
#[derive(Debug, Clone)]
struct GenerateClient {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl GenerateClient {
    async fn send(&self, prompt: &str, keep_alive: Option<u64>) -> Result<GenerateResponse, OperationError> {
        let body = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_owned(),
            stream: false,
            keep_alive,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let resp = error_for_status(resp).await?;
        let text = resp.text().await.map_err(|e| classify_reqwest_error(&e))?;
        serde_json::from_str::<GenerateResponse>(&text).map_err(|e| {
            OperationError::protocol(format!("generate response has no `response` field: {e}"))
        })
    }
}

/// One full non-streaming generation.
#[derive(Debug, Clone)]
pub struct GenerateOperation {
    inner: GenerateClient,
    prompt: String,
}

impl GenerateOperation {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            inner: GenerateClient {
                client,
                url: url.into(),
                model: model.into(),
            },
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
impl Operation for GenerateOperation {
    fn name(&self) -> &str {
        "generate"
    }

    async fn invoke(&self) -> Result<(), OperationError> {
        let response = self.inner.send(&self.prompt, None).await?;
        if response.response.trim().is_empty() {
            return Err(OperationError::protocol("model returned an empty response"));
        }
        Ok(())
    }
}

/// A cold model load: unload first (untimed), then time a load-only call.
///
/// An empty prompt makes the server load the model without generating.
#[derive(Debug, Clone)]
pub struct ModelLoadOperation {
    inner: GenerateClient,
}

impl ModelLoadOperation {
    pub fn new(client: reqwest::Client, url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            inner: GenerateClient {
                client,
                url: url.into(),
                model: model.into(),
            },
        }
    }
}

#[async_trait]
impl Operation for ModelLoadOperation {
    fn name(&self) -> &str {
        "model-load"
    }

    async fn prepare(&self) -> Result<(), OperationError> {
        self.inner.send("", Some(0)).await.map(|_| ())
    }

    async fn invoke(&self) -> Result<(), OperationError> {
        self.inner.send("", None).await.map(|_| ())
    }
}
