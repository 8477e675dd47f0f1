//! Record - Journal record envelope and kinds
//!
//! Every line in a journal file is one serialized [`Record`]. The
//! envelope is stable across kinds; the payload schema is owned by the
//! producer of the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a journal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Hub event (conversation, agent or file event envelope)
    Event,
    /// Full conversation state at a checkpoint
    ConversationSnapshot,
    /// Single conversation message
    Message,
    /// Agent task state
    Task,
    /// File store event
    FileEvent,
}

impl RecordKind {
    /// Returns the string representation of the record kind
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::ConversationSnapshot => "conversation_snapshot",
            Self::Message => "message",
            Self::Task => "task",
            Self::FileEvent => "file_event",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(Self::Event),
            "conversation_snapshot" => Ok(Self::ConversationSnapshot),
            "message" => Ok(Self::Message),
            "task" => Ok(Self::Task),
            "file_event" => Ok(Self::FileEvent),
            _ => Err(format!("unknown record kind: {s}")),
        }
    }
}

/// A single journal record
///
/// Records are immutable once appended. The id and timestamp are
/// supplied by the caller so that one id authority covers every
/// persisted artifact of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Unique record identifier
    pub record_id: String,

    /// When the record was produced
    pub timestamp: DateTime<Utc>,

    /// Record kind, selects the payload schema
    pub kind: RecordKind,

    /// Kind-specific payload
    pub payload: serde_json::Value,
}

impl Record {
    /// Create a new record
    #[must_use]
    pub fn new(
        record_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        kind: RecordKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            timestamp,
            kind,
            payload,
        }
    }

    /// Deserialize the payload into a concrete type
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
