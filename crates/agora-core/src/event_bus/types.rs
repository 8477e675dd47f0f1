//! Event envelope types
//!
//! Three event families share one envelope. Payloads deliberately stay
//! small: ids and outcomes, never full transcripts or credentials.
//! Detail lives in the journal and is fetched by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation lifecycle and message events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A conversation was created
    ConversationCreated {
        /// Conversation id
        conversation_id: String,
        /// Type tag
        conversation_type: String,
        /// Participants at creation
        participants: Vec<String>,
    },
    /// A message was appended
    MessageAdded {
        /// Conversation id
        conversation_id: String,
        /// Message id
        message_id: String,
        /// Author id
        author_id: String,
        /// Author kind tag
        author_kind: String,
    },
    /// A message was refused by the active protocol
    MessageRejected {
        /// Conversation id
        conversation_id: String,
        /// Author whose message was refused
        author_id: String,
        /// Stable rejection reason
        reason: String,
    },
    /// The conversation was paused
    ConversationPaused {
        /// Conversation id
        conversation_id: String,
    },
    /// The conversation resumed
    ConversationResumed {
        /// Conversation id
        conversation_id: String,
    },
    /// The conversation ended
    ConversationEnded {
        /// Conversation id
        conversation_id: String,
        /// Why it ended
        reason: String,
    },
    /// A participant joined mid-conversation
    ParticipantJoined {
        /// Conversation id
        conversation_id: String,
        /// Participant id
        participant_id: String,
    },
    /// A participant left; their turn slot is kept but inactive
    ParticipantLeft {
        /// Conversation id
        conversation_id: String,
        /// Participant id
        participant_id: String,
    },
}

/// Agent lifecycle and task events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AgentEvent {
    /// An agent was registered
    AgentAdded {
        /// Agent id
        agent_id: String,
    },
    /// An agent was removed; in-flight tasks stay runnable
    AgentRemoved {
        /// Agent id
        agent_id: String,
    },
    /// Agent configuration changed
    AgentUpdated {
        /// Agent id
        agent_id: String,
    },
    /// Agent active flag changed
    StatusUpdated {
        /// Agent id
        agent_id: String,
        /// New active flag
        active: bool,
    },
    /// A task entered the queue for an agent
    TaskAssigned {
        /// Task id
        task_id: String,
        /// Assignee agent id
        agent_id: String,
    },
    /// A task finished successfully
    TaskCompleted {
        /// Task id
        task_id: String,
        /// Assignee agent id
        agent_id: String,
        /// Wall time from start to completion
        latency_ms: u64,
    },
    /// A task failed or was cancelled
    TaskFailed {
        /// Task id
        task_id: String,
        /// Assignee agent id
        agent_id: String,
        /// Failure or cancellation reason
        reason: String,
    },
}

/// File store events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FileEvent {
    /// A file was uploaded
    FileUploaded {
        /// File id
        file_id: String,
        /// Owner principal
        owner_id: String,
        /// Original name
        name: String,
    },
    /// A file was downloaded
    FileDownloaded {
        /// File id
        file_id: String,
        /// Downloading principal
        principal_id: String,
    },
    /// A share link was minted
    FileShared {
        /// File id
        file_id: String,
    },
    /// A file was deleted
    FileDeleted {
        /// File id
        file_id: String,
        /// Deleting principal
        principal_id: String,
    },
    /// A collaboration session was opened
    CollabSessionCreated {
        /// Session id
        session_id: String,
        /// File the session edits
        file_id: String,
    },
    /// A change was accepted into a collaboration session
    CollabChangeApplied {
        /// Session id
        session_id: String,
        /// Assigned change id
        change_id: u64,
        /// Change author
        author_id: String,
    },
}

/// One of the three event families
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventBody {
    /// Conversation family
    Conversation(ConversationEvent),
    /// Agent family
    Agent(AgentEvent),
    /// File family
    File(FileEvent),
}

/// Family tag for routing subscribers that only care about one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    /// Conversation events
    Conversation,
    /// Agent events
    Agent,
    /// File events
    File,
}

impl EventBody {
    /// Which family the event belongs to
    #[must_use]
    pub fn family(&self) -> EventFamily {
        match self {
            Self::Conversation(_) => EventFamily::Conversation,
            Self::Agent(_) => EventFamily::Agent,
            Self::File(_) => EventFamily::File,
        }
    }
}

impl From<ConversationEvent> for EventBody {
    fn from(event: ConversationEvent) -> Self {
        Self::Conversation(event)
    }
}

impl From<AgentEvent> for EventBody {
    fn from(event: AgentEvent) -> Self {
        Self::Agent(event)
    }
}

impl From<FileEvent> for EventBody {
    fn from(event: FileEvent) -> Self {
        Self::File(event)
    }
}

/// Event envelope published on the bus and persisted to the journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    /// Unique event id
    pub id: String,
    /// When the event was produced
    pub timestamp: DateTime<Utc>,
    /// Component that produced the event
    pub producer_id: String,
    /// The event itself; serializes as `type` + `payload`
    #[serde(flatten)]
    pub body: EventBody,
}

impl HubEvent {
    /// Create an envelope
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        producer_id: impl Into<String>,
        body: impl Into<EventBody>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            producer_id: producer_id.into(),
            body: body.into(),
        }
    }
}
