//! Error types for agora-llm

use thiserror::Error;

/// Provider error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not registered or disabled
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Credentials rejected or unresolvable
    #[error("auth failure: {0}")]
    Auth(String),

    /// Network-level failure talking to the backend
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote asked to back off
    #[error("rate limited")]
    RateLimited {
        /// Seconds until retry is allowed, when the remote said so
        retry_after: Option<u64>,
    },

    /// Conversation prefix exceeds the model context window
    #[error("context exceeded: {0}")]
    ContextExceeded(String),

    /// Deadline crossed before the backend answered
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Model not offered by the targeted provider
    #[error("unknown model {model} for provider {provider}")]
    UnknownModel {
        /// Provider id the request targeted
        provider: String,
        /// Model id that is not registered
        model: String,
    },

    /// Backend answered with something unparseable
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether a retry with backoff can reasonably succeed.
    ///
    /// Auth and context errors are deterministic and surface
    /// immediately; transport, rate-limit and timeout failures are
    /// transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
