//! Mock provider for tests
//!
//! Queues scripted outcomes and records every request it receives so
//! tests can assert on dispatch counts and prefixes.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, Result};
use crate::provider::ChatProvider;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A mock chat provider with scripted outcomes.
pub struct MockProvider {
    outcomes: Arc<Mutex<VecDeque<Result<CompletionResponse>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider
    #[must_use]
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful completion with the given content
    pub fn queue_content(&self, content: impl Into<String>) {
        let content = content.into();
        let usage = TokenUsage {
            prompt_tokens: 8,
            completion_tokens: content.split_whitespace().count() as u32,
            total_tokens: 8 + content.split_whitespace().count() as u32,
        };
        self.queue_response(CompletionResponse {
            id: format!("mock-{}", uuid::Uuid::new_v4().simple()),
            model: "mock-model".to_string(),
            content,
            finish_reason: Some("stop".to_string()),
            usage: Some(usage),
            latency_ms: 1,
        });
    }

    /// Queue a full response
    pub fn queue_response(&self, response: CompletionResponse) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response));
    }

    /// Queue a failure
    pub fn queue_error(&self, error: Error) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Number of completion calls received so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Copies of every request received, in arrival order
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["mock-model".to_string()])
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let next = self
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(outcome) => outcome,
            // Default when the script runs dry, mirroring an always-happy backend.
            None => Ok(CompletionResponse {
                id: format!("mock-{}", uuid::Uuid::new_v4().simple()),
                model: "mock-model".to_string(),
                content: "mock response".to_string(),
                finish_reason: Some("stop".to_string()),
                usage: None,
                latency_ms: 1,
            }),
        }
    }
}
