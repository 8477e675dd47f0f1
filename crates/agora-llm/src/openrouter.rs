//! OpenRouter provider
//!
//! Speaks the OpenAI-compatible chat completions wire format. The API
//! key is resolved from the configured credential reference at request
//! time and never stored on the provider.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, Result};
use crate::message::ChatMessage;
use crate::provider::ChatProvider;
use crate::secret::SecretResolver;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Opaque reference resolved to the API key at request time
    pub credential_ref: String,
    /// Model used when a request does not pick one
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Application name reported to the gateway
    #[serde(default)]
    pub app_name: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    "openrouter/auto".to_string()
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            credential_ref: "OPENROUTER_API_KEY".to_string(),
            default_model: default_model(),
            app_name: None,
        }
    }
}

// Wire types for the OpenAI-compatible chat completions endpoint.

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    model: String,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireModelList {
    data: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    id: String,
}

/// OpenRouter chat provider
pub struct OpenRouterProvider {
    client: Client,
    config: OpenRouterConfig,
    secrets: Arc<dyn SecretResolver>,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider
    pub fn new(config: OpenRouterConfig, secrets: Arc<dyn SecretResolver>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Transport(format!("failed to create http client: {e}")))?;
        Ok(Self {
            client,
            config,
            secrets,
        })
    }

    fn convert_message(msg: &ChatMessage) -> WireMessage {
        WireMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }

    fn map_status(status: StatusCode, message: String, deadline: Duration) -> Error {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { retry_after: None },
            StatusCode::REQUEST_TIMEOUT => Error::Timeout(deadline.as_millis() as u64),
            StatusCode::PAYLOAD_TOO_LARGE => Error::ContextExceeded(message),
            StatusCode::BAD_REQUEST if message.to_lowercase().contains("context") => {
                Error::ContextExceeded(message)
            }
            _ => Error::Transport(format!("{status}: {message}")),
        }
    }

    fn retry_after_seconds(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }
}

#[async_trait::async_trait]
impl ChatProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let key = self.secrets.resolve(&self.config.credential_ref)?;
        let url = format!("{}/models", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(key.expose())
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, message, Duration::from_secs(30)));
        }

        let list: WireModelList = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let key = self.secrets.resolve(&self.config.credential_ref)?;
        let url = format!("{}/chat/completions", self.config.base_url);
        let deadline = request.deadline;

        let body = WireRequest {
            model: &request.model,
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut http = self
            .client
            .post(&url)
            .bearer_auth(key.expose())
            .timeout(deadline)
            .json(&body);
        if let Some(app_name) = &self.config.app_name {
            http = http.header("X-Title", app_name);
        }
        if let Some(idem) = &request.idempotency_key {
            http = http.header("Idempotency-Key", idem);
        }

        let started = Instant::now();
        let response = match tokio::time::timeout(deadline, http.send()).await {
            Err(_) => return Err(Error::Timeout(deadline.as_millis() as u64)),
            Ok(Err(e)) if e.is_timeout() => {
                return Err(Error::Timeout(deadline.as_millis() as u64))
            }
            Ok(Err(e)) => return Err(Error::Transport(e.to_string())),
            Ok(Ok(r)) => r,
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = Self::retry_after_seconds(response.headers());
            warn!(provider = "openrouter", ?retry_after, "Rate limited");
            return Err(Error::RateLimited { retry_after });
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<WireError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(Self::map_status(status, message, deadline));
        }

        let wire: WireResponse =
            serde_json::from_str(&text).map_err(|e| Error::InvalidResponse(e.to_string()))?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("response carried no choices".to_string()))?;

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(
            provider = "openrouter",
            model = %wire.model,
            latency_ms,
            "Completion received"
        );

        Ok(CompletionResponse {
            id: wire.id,
            model: wire.model,
            content: choice.message.content,
            finish_reason: choice.finish_reason,
            usage: wire.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            latency_ms,
        })
    }
}
