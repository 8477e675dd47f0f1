//! Conversation messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    /// A human participant
    User,
    /// An AI agent
    Agent,
    /// The hub itself (outage notices, summaries)
    System,
    /// A tool invocation
    Tool,
    /// A file share notice
    File,
}

impl AuthorKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
            Self::Tool => "tool",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for AuthorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One edit applied to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    /// When the edit happened
    pub timestamp: DateTime<Utc>,
    /// Who edited
    pub editor_id: String,
    /// Body before the edit
    pub previous_body: String,
    /// Why the edit happened
    pub reason: String,
}

/// A message in a conversation.
///
/// Immutable once appended except for the append-only edit history
/// (the body always reflects the latest edit) and vote/reaction
/// tallies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: String,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
    /// Author id
    pub author_id: String,
    /// Author kind
    pub author_kind: AuthorKind,
    /// Message body; reflects the latest edit
    pub body: String,
    /// Message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Thread the message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Append-only edit history, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edit_history: Vec<EditRecord>,
    /// Vote tallies per principal (democratic proposals)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub votes: HashMap<String, i32>,
    /// Emoji reactions: emoji to set of reacting principals
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reactions: HashMap<String, BTreeSet<String>>,
}

impl Message {
    /// Whether the message was edited after the initial append
    #[must_use]
    pub fn edited(&self) -> bool {
        !self.edit_history.is_empty()
    }

    /// Apply an edit: the old body joins the history, the new body
    /// becomes current.
    pub fn apply_edit(
        &mut self,
        editor_id: impl Into<String>,
        new_body: impl Into<String>,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) {
        self.edit_history.push(EditRecord {
            timestamp,
            editor_id: editor_id.into(),
            previous_body: std::mem::take(&mut self.body),
            reason: reason.into(),
        });
        self.body = new_body.into();
    }

    /// Net vote tally
    #[must_use]
    pub fn vote_total(&self) -> i64 {
        self.votes.values().map(|v| i64::from(*v)).sum()
    }
}

/// A message as submitted, before the hub assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    /// Author id
    pub author_id: String,
    /// Author kind
    pub author_kind: AuthorKind,
    /// Message body
    pub body: String,
    /// Message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Thread the message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MessageDraft {
    /// A user-authored draft
    #[must_use]
    pub fn user(author_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(author_id, AuthorKind::User, body)
    }

    /// An agent-authored draft
    #[must_use]
    pub fn agent(author_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(author_id, AuthorKind::Agent, body)
    }

    /// A system draft
    #[must_use]
    pub fn system(body: impl Into<String>) -> Self {
        Self::new("system", AuthorKind::System, body)
    }

    /// A draft with explicit author kind
    #[must_use]
    pub fn new(author_id: impl Into<String>, author_kind: AuthorKind, body: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            author_kind,
            body: body.into(),
            parent_id: None,
            thread_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the parent message
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Materialize into a message
    #[must_use]
    pub fn into_message(
        self,
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Message {
        Message {
            id: id.into(),
            timestamp,
            author_id: self.author_id,
            author_kind: self.author_kind,
            body: self.body,
            parent_id: self.parent_id,
            thread_id: self.thread_id,
            conversation_id: conversation_id.into(),
            metadata: self.metadata,
            edit_history: Vec::new(),
            votes: HashMap::new(),
            reactions: HashMap::new(),
        }
    }
}
