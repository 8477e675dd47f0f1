//! Conversation state and turn order

use super::message::Message;
use super::types::{ConversationKind, ProtocolSettings};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Created, waiting for the first message
    Forming,
    /// Live
    Active,
    /// Suspended; no appends accepted
    Paused,
    /// Terminal
    Ended,
}

impl ConversationState {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forming => "forming",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }

    /// Whether `self -> next` is a legal transition
    #[must_use]
    pub fn can_transition(&self, next: ConversationState) -> bool {
        matches!(
            (self, next),
            (Self::Forming, Self::Active)
                | (Self::Active, Self::Paused)
                | (Self::Paused, Self::Active)
                | (Self::Active, Self::Ended)
                | (Self::Paused, Self::Ended)
        )
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One slot in the turn order.
///
/// Slots are never removed so indices stay stable across departures
/// and replay; departed participants just go inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    /// Participant occupying the slot
    pub participant_id: String,
    /// Whether the participant is still present
    pub active: bool,
}

/// Per-protocol scratch state that has to survive snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolState {
    /// brainstorm: true once the convergent phase opened
    #[serde(default)]
    pub convergent_phase: bool,
    /// socratic: follow-up depth used so far on the current line
    #[serde(default)]
    pub followup_depth: u32,
    /// consensus: rounds completed
    #[serde(default)]
    pub consensus_rounds: u32,
    /// debate: when the current speaking window opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_opened_at: Option<DateTime<Utc>>,
    /// hierarchical: drafts queued until the moderator yields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub held_drafts: Vec<super::message::MessageDraft>,
}

/// A conversation and everything it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation id
    pub id: String,
    /// Protocol tag
    pub kind: ConversationKind,
    /// Participants in join order; departure does not remove entries
    pub participants: Vec<String>,
    /// Moderator, when the type demands one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderator_id: Option<String>,
    /// What the conversation is about
    pub subject: String,
    /// Who created it
    pub creator_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Lifecycle state
    pub state: ConversationState,
    /// Stable turn slots
    pub turn_order: Vec<TurnEntry>,
    /// Index of the slot whose turn it is
    pub turn_cursor: usize,
    /// Messages, append order
    pub messages: Vec<Message>,
    /// Protocol settings resolved at creation
    pub settings: ProtocolSettings,
    /// Protocol scratch state
    #[serde(default)]
    pub protocol: ProtocolState,
}

impl Conversation {
    /// Participants currently active, in turn order
    #[must_use]
    pub fn active_participants(&self) -> Vec<&str> {
        self.turn_order
            .iter()
            .filter(|e| e.active)
            .map(|e| e.participant_id.as_str())
            .collect()
    }

    /// Whether `id` is a participant (active or departed)
    #[must_use]
    pub fn is_participant(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p == id)
    }

    /// Whether `id` is an active participant
    #[must_use]
    pub fn is_active_participant(&self, id: &str) -> bool {
        self.turn_order
            .iter()
            .any(|e| e.active && e.participant_id == id)
    }

    /// Participant whose turn it is, skipping inactive slots.
    ///
    /// `None` when every slot is inactive.
    #[must_use]
    pub fn current_speaker(&self) -> Option<&str> {
        if self.turn_order.is_empty() {
            return None;
        }
        let len = self.turn_order.len();
        (0..len)
            .map(|offset| &self.turn_order[(self.turn_cursor + offset) % len])
            .find(|e| e.active)
            .map(|e| e.participant_id.as_str())
    }

    /// Advance the cursor past the current speaker
    pub fn advance_turn(&mut self) {
        if self.turn_order.is_empty() {
            return;
        }
        let len = self.turn_order.len();
        // Land on the current speaker's slot first, then step once.
        for offset in 0..len {
            let index = (self.turn_cursor + offset) % len;
            if self.turn_order[index].active {
                self.turn_cursor = (index + 1) % len;
                return;
            }
        }
    }

    /// Append a participant; a new turn slot goes to the end
    pub fn add_participant(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.is_participant(&id) {
            self.participants.push(id.clone());
        }
        match self
            .turn_order
            .iter_mut()
            .find(|e| e.participant_id == id)
        {
            Some(entry) => entry.active = true,
            None => self.turn_order.push(TurnEntry {
                participant_id: id,
                active: true,
            }),
        }
    }

    /// Mark a participant departed; the slot stays for index stability
    pub fn deactivate_participant(&mut self, id: &str) {
        if let Some(entry) = self
            .turn_order
            .iter_mut()
            .find(|e| e.participant_id == id)
        {
            entry.active = false;
        }
    }

    /// Transition to `next`, enforcing the state machine
    pub fn transition(&mut self, next: ConversationState, now: DateTime<Utc>) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(Error::InvalidState(format!(
                "conversation {} cannot go {} -> {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Messages authored by `author_id`
    #[must_use]
    pub fn messages_by(&self, author_id: &str) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.author_id == author_id)
            .collect()
    }
}
