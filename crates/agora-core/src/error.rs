//! Error types for agora-core
//!
//! Protocol refusals, identity errors and backpressure are distinct
//! kinds so callers can decide between surfacing, retrying and giving
//! up.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Caller passed unparseable or out-of-range input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not legal for the current conversation or task state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Conversation type configuration is malformed or disabled
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Author is not a participant of the conversation
    #[error("{author} is not a participant of conversation {conversation}")]
    NotAParticipant {
        /// Conversation the message targeted
        conversation: String,
        /// Author that attempted the append
        author: String,
    },

    /// Conversation type requires a moderator and none was given
    #[error("conversation type {0} requires a moderator")]
    ModeratorMissing(String),

    /// Participant is neither a known agent nor a registered user
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// Principal lacks the required permission
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Speaking out of turn under a strict-turn protocol
    #[error("out of turn in conversation {conversation}: expected {expected}, got {author}")]
    OutOfTurn {
        /// Conversation enforcing the turn order
        conversation: String,
        /// Author that spoke
        author: String,
        /// Participant whose turn it is
        expected: String,
    },

    /// Participant count outside the type's [min, max] range
    #[error("participant count {given} outside [{min}, {max}]")]
    OutOfCapacityRange {
        /// Count supplied
        given: usize,
        /// Type minimum
        min: usize,
        /// Type maximum
        max: usize,
    },

    /// Task queue is at capacity
    #[error("task queue full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// Provider-side failure
    #[error("provider error: {0}")]
    Provider(#[from] agora_llm::Error),

    /// Journal failure
    #[error("journal error: {0}")]
    Journal(#[from] agora_replay::Error),

    /// File store failure
    #[error("file error: {0}")]
    File(#[from] agora_files::Error),
}

impl Error {
    /// Short stable tag used in system messages and rejection events
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::NotFound(_) => "not_found",
            Self::NotAParticipant { .. } => "not_a_participant",
            Self::ModeratorMissing(_) => "moderator_missing",
            Self::UnknownParticipant(_) => "unknown_participant",
            Self::Unauthorized(_) => "unauthorized",
            Self::OutOfTurn { .. } => "out_of_turn",
            Self::OutOfCapacityRange { .. } => "out_of_capacity_range",
            Self::QueueFull { .. } => "queue_full",
            Self::Provider(e) => match e {
                agora_llm::Error::Auth(_) => "auth_failure",
                agora_llm::Error::Transport(_) => "transport_failure",
                agora_llm::Error::RateLimited { .. } => "rate_limited",
                agora_llm::Error::ContextExceeded(_) => "context_exceeded",
                agora_llm::Error::Timeout(_) => "timeout",
                _ => "provider_failure",
            },
            Self::Journal(e) => match e {
                agora_replay::Error::Schema(_) => "schema_failure",
                _ => "io_failure",
            },
            Self::File(e) => match e {
                agora_files::Error::SizeExceeded { .. } => "size_exceeded",
                agora_files::Error::TypeDisallowed(_) => "type_disallowed",
                agora_files::Error::NotFound(_) => "not_found",
                agora_files::Error::Unauthorized { .. } => "unauthorized",
                agora_files::Error::InvalidState(_) => "invalid_state",
                agora_files::Error::Schema(_) => "schema_failure",
                agora_files::Error::Io(_) => "io_failure",
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
