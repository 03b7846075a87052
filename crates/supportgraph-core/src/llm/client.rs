//! OpenRouter-compatible completion client for ticket extraction
//!
//! One call walks the configured models in order and stops at the first
//! answer. Only model-availability failures move on to the next model;
//! retrying transient failures is left to the ingestion pipeline.

use std::time::Duration;

use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{Completion, CompletionRequest, CompletionResponse};

/// Seconds to wait when a 429 carries no hint
const DEFAULT_RETRY_AFTER: u64 = 60;

#[derive(Clone)]
pub struct LlmClient {
    http: HttpClient,
    config: LlmConfig,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("endpoint", &self.endpoint)
            .field("models", &self.models().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of one model attempt
enum Attempt {
    Done(Completion),
    /// The model cannot serve the request; try the next one
    Unavailable(Error),
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("LLM API key is empty".to_string()));
        }
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            http,
            config,
            api_key,
            endpoint,
        })
    }

    /// Default model first, then the fallbacks
    pub fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.config.default_model.as_str())
            .chain(self.config.fallback_models.iter().map(String::as_str))
    }

    /// Ask for a JSON-object answer to `user` under the `system` instructions
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<Completion> {
        let mut last_unavailable = None;

        for model in self.models() {
            let request = CompletionRequest::new(
                model,
                system,
                user,
                self.config.temperature,
                self.config.max_tokens,
            );
            match self.attempt(&request, model).await? {
                Attempt::Done(completion) => {
                    info!(
                        model = %completion.model,
                        tokens = completion.tokens_used,
                        "Extraction completion received"
                    );
                    return Ok(completion);
                }
                Attempt::Unavailable(e) => {
                    warn!(model, error = %e, "Model unavailable, trying next model");
                    last_unavailable = Some(e);
                }
            }
        }

        Err(last_unavailable.unwrap_or_else(|| Error::LLMError("No model configured".to_string())))
    }

    async fn attempt(&self, request: &CompletionRequest<'_>, model: &str) -> Result<Attempt> {
        debug!(model, "Sending completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Supportgraph")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = error_for_status(status, &body);
            return if model_unavailable(status, &body) {
                Ok(Attempt::Unavailable(error))
            } else {
                Err(error)
            };
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Unreadable completion from {}: {}", model, e)))?;
        body.into_completion()
            .map(Attempt::Done)
            .ok_or_else(|| Error::LLMError(format!("{} returned no choices", model)))
    }
}

fn error_for_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::LLMError(
            "Unauthorized: set SUPPORTGRAPH_API_KEY or OPENROUTER_API_KEY to a valid key"
                .to_string(),
        ),
        StatusCode::PAYMENT_REQUIRED => Error::LLMError("Insufficient credits".to_string()),
        StatusCode::TOO_MANY_REQUESTS => {
            Error::RateLimited(retry_after(body).unwrap_or(DEFAULT_RETRY_AFTER))
        }
        s if s.is_server_error() => Error::LLMError(format!("Server error ({}): {}", s.as_u16(), body)),
        s => Error::LLMError(format!("HTTP {}: {}", s.as_u16(), body)),
    }
}

/// Whether another model might succeed where this one failed
fn model_unavailable(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }
    let body = body.to_lowercase();
    ["model not found", "no available provider", "overloaded", "unavailable"]
        .iter()
        .any(|pattern| body.contains(pattern))
}

/// `retry_after` seconds, at the top level or under `error`
fn retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.pointer("/error/retry_after"))
        .and_then(|v| v.as_u64())
}
