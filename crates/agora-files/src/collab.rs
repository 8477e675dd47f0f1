//! Collaborative editing sessions
//!
//! Changes are linearized by arrival order at the store; there is no
//! operational transformation. Conflicting edits at one position
//! resolve last-writer-wins: the later change simply applies to the
//! text the earlier one produced.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Kind of a collaborative change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Insert `payload` at `position`
    Insert,
    /// Remove `span` characters at `position`
    Delete,
    /// Remove `span` characters at `position`, then insert `payload`
    Replace,
    /// Annotation only; content is unchanged
    Format,
}

/// A change requested by a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Participant submitting the change
    pub author_id: String,
    /// Change kind
    pub kind: ChangeKind,
    /// Character position the change applies at
    pub position: usize,
    /// Text inserted (insert/replace) or format tag (format)
    #[serde(default)]
    pub payload: String,
    /// Characters affected (delete/replace)
    #[serde(default)]
    pub span: usize,
}

/// A change accepted into a session, with its assigned sequence id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    /// Monotonically increasing id within the session
    pub id: u64,
    /// Participant that submitted the change
    pub author_id: String,
    /// When the store accepted the change
    pub timestamp: DateTime<Utc>,
    /// Change kind
    pub kind: ChangeKind,
    /// Character position
    pub position: usize,
    /// Inserted text or format tag
    pub payload: String,
    /// Characters affected
    pub span: usize,
}

/// A collaborative editing session over one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollabSession {
    /// Session id
    pub id: String,
    /// File the session edits
    pub file_id: String,
    /// Participants allowed to submit changes
    pub participants: Vec<String>,
    /// Whether the session accepts changes
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last change time
    pub updated_at: DateTime<Utc>,
    /// Body the session started from
    pub initial_body: String,
    /// Accepted changes in arrival order; version == changes.len()
    pub changes: Vec<Change>,
    /// Latest cursor position per participant
    pub cursors: HashMap<String, usize>,
}

impl CollabSession {
    /// Session version; equals the number of accepted changes
    #[must_use]
    pub fn version(&self) -> u64 {
        self.changes.len() as u64
    }

    /// Materialize the body: left-fold of changes in arrival order.
    #[must_use]
    pub fn materialize(&self) -> String {
        let mut body: Vec<char> = self.initial_body.chars().collect();
        for change in &self.changes {
            apply(&mut body, change);
        }
        body.into_iter().collect()
    }
}

fn apply(body: &mut Vec<char>, change: &Change) {
    let at = change.position.min(body.len());
    match change.kind {
        ChangeKind::Insert => {
            body.splice(at..at, change.payload.chars());
        }
        ChangeKind::Delete => {
            let end = (at + change.span).min(body.len());
            body.drain(at..end);
        }
        ChangeKind::Replace => {
            let end = (at + change.span).min(body.len());
            body.splice(at..end, change.payload.chars());
        }
        ChangeKind::Format => {}
    }
}

/// Manager for collaborative sessions
#[derive(Default)]
pub struct CollabManager {
    sessions: RwLock<HashMap<String, CollabSession>>,
}

impl CollabManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session for `file_id` seeded with `initial_body`
    pub async fn open_session(
        &self,
        file_id: impl Into<String>,
        participants: Vec<String>,
        initial_body: impl Into<String>,
    ) -> CollabSession {
        let now = Utc::now();
        let session = CollabSession {
            id: format!("collab-{}", uuid::Uuid::new_v4().simple()),
            file_id: file_id.into(),
            participants,
            is_active: true,
            created_at: now,
            updated_at: now,
            initial_body: initial_body.into(),
            changes: Vec::new(),
            cursors: HashMap::new(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        debug!(session = %session.id, file = %session.file_id, "Collab session opened");
        session
    }

    /// Add a participant to a session
    pub async fn join(&self, session_id: &str, principal: impl Into<String>) -> Result<()> {
        let principal = principal.into();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
        if !session.is_active {
            return Err(Error::InvalidState(format!("session {session_id} is closed")));
        }
        if session.participants.contains(&principal) {
            return Err(Error::InvalidState(format!(
                "{principal} is already in session {session_id}"
            )));
        }
        session.participants.push(principal);
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Accept a change, assigning the next sequence id.
    ///
    /// Returns the accepted change. The session version afterwards
    /// equals the number of accepted changes.
    pub async fn apply_change(&self, session_id: &str, request: ChangeRequest) -> Result<Change> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
        if !session.is_active {
            return Err(Error::InvalidState(format!("session {session_id} is closed")));
        }
        if !session.participants.contains(&request.author_id) {
            return Err(Error::Unauthorized {
                principal: request.author_id,
                right: "write".to_string(),
                file: session.file_id.clone(),
            });
        }

        let change = Change {
            id: session.changes.len() as u64 + 1,
            author_id: request.author_id,
            timestamp: Utc::now(),
            kind: request.kind,
            position: request.position,
            payload: request.payload,
            span: request.span,
        };
        let cursor = match change.kind {
            ChangeKind::Insert | ChangeKind::Replace => {
                change.position + change.payload.chars().count()
            }
            ChangeKind::Delete | ChangeKind::Format => change.position,
        };
        session.cursors.insert(change.author_id.clone(), cursor);
        session.changes.push(change.clone());
        session.updated_at = Utc::now();
        Ok(change)
    }

    /// Close a session; further joins and changes are refused
    pub async fn close(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
        session.is_active = false;
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Fetch a session snapshot
    pub async fn get(&self, session_id: &str) -> Result<CollabSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(session_id.to_string()))
    }

    /// Sessions still accepting changes
    pub async fn active_sessions(&self) -> Vec<CollabSession> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<CollabSession> =
            sessions.values().filter(|s| s.is_active).cloned().collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        active
    }
}
