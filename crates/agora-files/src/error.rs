//! Error types for agora-files

use thiserror::Error;

/// File store error type
#[derive(Debug, Error)]
pub enum Error {
    /// File larger than the configured upload limit
    #[error("file size {size} exceeds maximum {max}")]
    SizeExceeded {
        /// Actual size in bytes
        size: u64,
        /// Configured maximum in bytes
        max: u64,
    },

    /// Extension outside the allow-list
    #[error("file type {0} is not allowed")]
    TypeDisallowed(String),

    /// Requested file or session does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Principal lacks the required right
    #[error("unauthorized: {principal} lacks {right} on {file}")]
    Unauthorized {
        /// Principal that attempted the operation
        principal: String,
        /// Right that was missing
        right: String,
        /// File the operation targeted
        file: String,
    },

    /// Operation not legal for the session state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Filesystem failure
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// Index record could not be serialized or parsed
    #[error("schema failure: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
