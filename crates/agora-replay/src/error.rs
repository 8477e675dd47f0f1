//! Error types for agora-replay

use thiserror::Error;

/// Journal error type
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying medium rejected a read or write
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized or deserialized
    #[error("schema failure: {0}")]
    Schema(#[from] serde_json::Error),

    /// Requested offset lies beyond the end of the journal
    #[error("offset {offset} past end of journal ({len} bytes)")]
    OffsetOutOfRange {
        /// Requested byte offset
        offset: u64,
        /// Current journal length in bytes
        len: u64,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
