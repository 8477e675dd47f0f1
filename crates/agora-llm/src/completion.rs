//! Completion request and response types

use crate::message::ChatMessage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-request deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use (provider-specific)
    pub model: String,
    /// Conversation prefix, oldest first
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Deadline for the whole call, including connection setup
    pub deadline: Duration,
    /// Token making network-level retries idempotent on the backend.
    /// Without one the provider may double-count usage on retry.
    pub idempotency_key: Option<String>,
}

impl CompletionRequest {
    /// Create a new completion request
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            max_tokens: None,
            temperature: None,
            deadline: DEFAULT_DEADLINE,
            idempotency_key: None,
        }
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Add messages
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the call deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Set the idempotency token
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Backend-assigned response id
    pub id: String,
    /// Model that produced the completion
    pub model: String,
    /// Generated content
    pub content: String,
    /// Finish reason reported by the backend
    pub finish_reason: Option<String>,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Wall time the call took, measured by the caller side
    pub latency_ms: u64,
}
