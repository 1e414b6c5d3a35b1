//! HTTP implementation of the AI client
//!
//! Talks to an OpenAI-compatible chat completions endpoint. The base URL is
//! configurable so tests can point the client at a mock server. Calls are
//! bounded by the configured timeout and retried at most once, and only for
//! failures a retry can help with (transport errors and 5xx responses);
//! client errors such as a rejected request or bad credentials fail
//! immediately.

use crate::ai::{AiClient, CompletionRequest};
use crate::config::AiConfig;
use crate::error::{GrantflowError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible chat completions client
///
/// # Examples
///
/// ```no_run
/// use grantflow::ai::{AiClient, CompletionRequest, HttpAiClient};
/// use grantflow::config::AiConfig;
///
/// # async fn example() -> grantflow::error::Result<()> {
/// let client = HttpAiClient::new(AiConfig::default())?;
/// let text = client
///     .complete(&CompletionRequest::new("You are terse.", "Say hi."))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpAiClient {
    client: Client,
    config: AiConfig,
}

/// Request body for the chat completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

/// One chat message in API format
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Response body from the chat completions endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// One completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl HttpAiClient {
    /// Create a new HTTP AI client
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: AiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("grantflow/0.2.0")
            .build()
            .map_err(|e| GrantflowError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized AI client: api_base={}, model={}, timeout={}s",
            config.api_base,
            config.model,
            config.timeout_seconds
        );

        Ok(Self { client, config })
    }

    /// API key from the configured environment variable, if set
    fn api_key(&self) -> Option<String> {
        std::env::var(&self.config.api_key_env).ok()
    }

    /// Run one request attempt against the endpoint
    async fn attempt(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, AttemptError> {
        let url = format!("{}/chat/completions", self.config.api_base);
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            temperature: 0.2,
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = self.api_key() {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AttemptError::retryable(format!("Request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("AI API returned {}: {}", status, text);
            return Err(if status.is_server_error() {
                AttemptError::retryable(message)
            } else {
                AttemptError::fatal(message)
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(format!("Failed to decode AI response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AttemptError::fatal("AI API returned no choices".to_string()))
    }
}

/// One attempt's failure, tagged with whether a retry could help
struct AttemptError {
    message: String,
    retryable: bool,
}

impl AttemptError {
    fn retryable(message: String) -> Self {
        Self {
            message,
            retryable: true,
        }
    }

    fn fatal(message: String) -> Self {
        Self {
            message,
            retryable: false,
        }
    }
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        match self.attempt(request).await {
            Ok(content) => Ok(content),
            Err(first_err) if first_err.retryable => {
                // One retry, then give up and let the call site fall back.
                tracing::warn!("AI call failed, retrying once: {}", first_err.message);
                self.attempt(request).await.map_err(|e| {
                    tracing::warn!("AI retry failed: {}", e.message);
                    GrantflowError::Provider(e.message).into()
                })
            }
            Err(first_err) => Err(GrantflowError::Provider(first_err.message).into()),
        }
    }
}
