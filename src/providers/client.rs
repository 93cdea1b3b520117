//! LLM client abstraction consumed by the Provider Manager (C7).
//!
//! `LlmClient` is the seam the pipeline stages (C9) call through; the HTTP
//! implementation is swapped for a deterministic mock in pipeline tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderEndpoint;

#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Rough token estimate for quota accounting, computed by the caller
    /// before the request is sent (the exact count isn't known until the
    /// provider replies, but quota must be checked beforehand).
    pub estimated_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub tokens_used: u64,
}

#[derive(Debug, Error)]
pub enum LlmClientError {
    #[error("request error: {0}")]
    Request(String),
    #[error("timed out waiting for provider response")]
    Timeout,
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmClientError>;
}

/// Talks to a single configured provider endpoint over HTTP. The wire shape
/// here is intentionally generic (`prompt` in, `completion` out) since the
/// spec treats "the LLM provider" as an interchangeable black box rather
/// than naming a concrete vendor API.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn new(endpoint: &ProviderEndpoint, timeout: Duration) -> Self {
        let api_key = endpoint
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok());
        Self {
            http: reqwest::Client::new(),
            base_url: endpoint.base_url.clone().unwrap_or_else(|| {
                format!("https://api.{}.example.invalid", endpoint.id)
            }),
            api_key,
            timeout,
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    system_prompt: &'a str,
    user_prompt: &'a str,
    max_tokens: u64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    completion: String,
    #[serde(default)]
    tokens_used: u64,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmClientError> {
        let url = format!("{}/v1/complete", self.base_url);
        let body = CompletionRequest {
            system_prompt: &request.system_prompt,
            user_prompt: &request.user_prompt,
            max_tokens: request.estimated_tokens.max(256),
        };

        let mut req = self.http.post(&url).json(&body).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmClientError::Timeout
            } else {
                LlmClientError::Request(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::Status { status: status.as_u16(), body });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmClientError::Request(err.to_string()))?;

        Ok(LlmResponse { text: parsed.completion, tokens_used: parsed.tokens_used })
    }
}
