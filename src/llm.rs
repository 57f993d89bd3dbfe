//! Text-completion client.
//!
//! [`CompletionClient`] is the seam between the chat flow and the external
//! completion API. [`OpenAiClient`] talks to an OpenAI-compatible
//! `/chat/completions` endpoint; tests substitute their own implementation.
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::KoaError;
use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the assistant text for `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<String, KoaError>;
}

/// Failure of a single HTTP attempt, tagged with whether it is worth retrying.
#[derive(Debug)]
struct AttemptError {
    retryable: bool,
    message: String,
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    /// Build a client from config. Fails when no API key is configured.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, KoaError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| KoaError::Completion("OPENAI_API_KEY not set".into()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KoaError::Completion(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
            retry: RetryPolicy {
                max_attempts: config.max_retries + 1,
                initial_delay: Duration::from_secs(1),
                backoff_factor: 2,
            },
        })
    }

    async fn attempt(&self, body: &CompletionRequest) -> Result<String, AttemptError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError {
                retryable: true,
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response.json().await.map_err(|e| AttemptError {
                retryable: false,
                message: format!("invalid response body: {e}"),
            })?;
            return parse_completion(&json).map_err(|message| AttemptError {
                retryable: false,
                message,
            });
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(AttemptError {
            retryable: status.as_u16() == 429 || status.is_server_error(),
            message: format!("completion API error {status}: {body_text}"),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, KoaError> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "requesting completion"
        );
        with_retry(&self.retry, |_| self.attempt(&request), |e: &AttemptError| e.retryable)
            .await
            .map_err(|e| KoaError::Completion(e.message))
    }
}

/// Stand-in used when no API key is configured. Every call fails, so chat
/// answers degrade to the apology reply instead of the server refusing to start.
pub struct UnconfiguredClient;

#[async_trait]
impl CompletionClient for UnconfiguredClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, KoaError> {
        Err(KoaError::Completion("API key not configured".into()))
    }
}

/// Build the configured client, falling back to [`UnconfiguredClient`].
pub fn client_from_config(config: &CompletionConfig) -> std::sync::Arc<dyn CompletionClient> {
    match OpenAiClient::from_config(config) {
        Ok(client) => std::sync::Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "completion client unavailable, chat replies will degrade");
            std::sync::Arc::new(UnconfiguredClient)
        }
    }
}

/// Extract `choices[0].message.content` from a chat completion response.
pub fn parse_completion(json: &serde_json::Value) -> Result<String, String> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| "invalid completion response: missing choices[0].message.content".to_string())?;

    let content = content.trim();
    if content.is_empty() {
        return Err("completion response was empty".into());
    }
    Ok(content.to_string())
}
