use crate::config::AnalystConfig;
use crate::error::{AnalystError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One chat-completion request: model, messages, sampling temperature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl CompletionRequest {
    /// A request carrying a single user-role message.
    pub fn user_prompt(model: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            temperature,
        }
    }

    pub fn prompt(&self) -> &str {
        self.messages.first().map(|m| m.content.as_str()).unwrap_or("")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion payload: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Auth and other client errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::Malformed(_) => false,
        }
    }
}

/// The external completion capability. Injected into the classifier and the
/// narrative generator so tests can substitute a scripted stub.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError>;
}

/// Timeout and retry budget for one logical external call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Run `request` under `policy`: every attempt is bounded by the timeout and
/// retryable failures are retried up to `max_retries` times.
pub async fn complete_with_policy(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    policy: &CallPolicy,
) -> std::result::Result<String, LlmError> {
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, client.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(text) => return Ok(text),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    "LLM call failed ({}); retry {}/{}",
                    err, attempt, policy.max_retries
                );
                if !policy.retry_backoff.is_zero() {
                    tokio::time::sleep(policy.retry_backoff).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// OpenAI-compatible `/chat/completions` client (Groq by default).
#[derive(Clone)]
pub struct ChatCompletionClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChatCompletionClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AnalystError::Config("LLM API key is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalystError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AnalystConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            AnalystError::Config("No API key configured (set GROQ_API_KEY or pass --api-key)".to_string())
        })?;
        Self::new(api_key, config.base_url.clone(), config.request_timeout())
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError> {
        debug!("LLM request to model {} (temperature {})", request.model, request.temperature);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Malformed("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}
