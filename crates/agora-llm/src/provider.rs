//! Provider trait definition

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;

/// Trait for chat completion providers
///
/// Implementations must be safe for concurrent use: the router issues
/// requests for several agents against one provider at a time.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable provider name
    fn name(&self) -> &str;

    /// Models the backend currently offers
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Model used when a request does not pick one
    fn default_model(&self) -> &str;

    /// Complete a conversation prefix.
    ///
    /// The call observes `request.deadline`; crossing it yields
    /// [`crate::Error::Timeout`] and any in-flight work is abandoned.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
