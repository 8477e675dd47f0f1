//! Conversation manager
//!
//! Owns every live conversation. All mutation funnels through this
//! API: one writer per conversation, readers get clones. State-machine
//! violations return errors without mutating or emitting anything.

use super::message::{Message, MessageDraft};
use super::state::{Conversation, ConversationState, ProtocolState, TurnEntry};
use super::types::{ConversationKind, TypeRegistry};
use crate::agents::AgentManager;
use crate::error::{Error, Result};
use crate::event_bus::{ConversationEvent, EventBus, HubEvent};
use crate::id::IdGenerator;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const PRODUCER: &str = "conversation_manager";

/// Reason tag used when a conversation auto-ends below its minimum
pub const REASON_BELOW_MINIMUM: &str = "BelowMinimumParticipants";

/// Manages conversation lifecycles, membership and turn order
pub struct ConversationManager {
    registry: TypeRegistry,
    conversations: RwLock<HashMap<String, Conversation>>,
    users: RwLock<HashSet<String>>,
    agents: Arc<AgentManager>,
    bus: Arc<EventBus>,
    ids: Arc<IdGenerator>,
}

impl ConversationManager {
    /// Create a manager over the given type registry
    #[must_use]
    pub fn new(
        registry: TypeRegistry,
        agents: Arc<AgentManager>,
        bus: Arc<EventBus>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            registry,
            conversations: RwLock::new(HashMap::new()),
            users: RwLock::new(HashSet::new()),
            agents,
            bus,
            ids,
        }
    }

    /// The type registry in use
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    async fn emit(&self, event: ConversationEvent) {
        let envelope = HubEvent::new(self.ids.mint(), self.ids.now(), PRODUCER, event);
        self.bus.publish(envelope).await;
    }

    /// Register a human participant
    pub async fn register_user(&self, user_id: impl Into<String>) {
        self.users.write().await.insert(user_id.into());
    }

    async fn participant_known(&self, id: &str) -> bool {
        self.users.read().await.contains(id) || self.agents.exists(id).await
    }

    /// Create a conversation.
    ///
    /// Validates the type, the participant count, moderator presence
    /// and that every participant is a known agent or registered user.
    pub async fn create_conversation(
        &self,
        kind: ConversationKind,
        participants: Vec<String>,
        subject: impl Into<String>,
        creator_id: impl Into<String>,
        moderator_id: Option<String>,
    ) -> Result<Conversation> {
        let config = self
            .registry
            .get(kind)
            .filter(|c| c.enabled)
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!("conversation type {kind} is not available"))
            })?;

        if participants.len() < config.min_participants
            || participants.len() > config.max_participants
        {
            return Err(Error::OutOfCapacityRange {
                given: participants.len(),
                min: config.min_participants,
                max: config.max_participants,
            });
        }

        if config.requires_moderator {
            match &moderator_id {
                Some(m) if participants.contains(m) => {}
                _ => return Err(Error::ModeratorMissing(kind.as_str().to_string())),
            }
        }

        for participant in &participants {
            if !self.participant_known(participant).await {
                return Err(Error::UnknownParticipant(participant.clone()));
            }
        }

        let now = self.ids.now();
        let conversation = Conversation {
            id: self.ids.mint(),
            kind,
            turn_order: participants
                .iter()
                .map(|p| TurnEntry {
                    participant_id: p.clone(),
                    active: true,
                })
                .collect(),
            participants: participants.clone(),
            moderator_id,
            subject: subject.into(),
            creator_id: creator_id.into(),
            created_at: now,
            updated_at: now,
            state: ConversationState::Forming,
            turn_cursor: 0,
            messages: Vec::new(),
            settings: config.settings.clone(),
            protocol: ProtocolState::default(),
        };

        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());

        info!(conversation = %conversation.id, kind = %kind, "Conversation created");
        self.emit(ConversationEvent::ConversationCreated {
            conversation_id: conversation.id.clone(),
            conversation_type: kind.as_str().to_string(),
            participants,
        })
        .await;
        Ok(conversation)
    }

    /// Append a message.
    ///
    /// A forming conversation becomes active on its first message.
    /// Strict-turn protocols refuse out-of-turn authors with
    /// `OutOfTurn`; the caller buffers and retries on its next turn.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<Message> {
        let (message, author_kind) = {
            let mut conversations = self.conversations.write().await;
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;

            match conversation.state {
                ConversationState::Ended => {
                    return Err(Error::InvalidState(format!(
                        "conversation {conversation_id} has ended"
                    )))
                }
                ConversationState::Paused => {
                    return Err(Error::InvalidState(format!(
                        "conversation {conversation_id} is paused"
                    )))
                }
                ConversationState::Forming | ConversationState::Active => {}
            }

            let is_system = draft.author_kind == super::message::AuthorKind::System;
            if !is_system && !conversation.is_participant(&draft.author_id) {
                return Err(Error::NotAParticipant {
                    conversation: conversation_id.to_string(),
                    author: draft.author_id.clone(),
                });
            }

            if conversation.kind.strict_turn() && !is_system {
                let expected = conversation
                    .current_speaker()
                    .map(str::to_string)
                    .unwrap_or_default();
                if expected != draft.author_id {
                    return Err(Error::OutOfTurn {
                        conversation: conversation_id.to_string(),
                        author: draft.author_id.clone(),
                        expected,
                    });
                }
            }

            let now = self.ids.now();
            if conversation.state == ConversationState::Forming {
                conversation.transition(ConversationState::Active, now)?;
            }

            let author_kind = draft.author_kind;
            let message = draft.into_message(self.ids.mint(), conversation_id.to_string(), now);
            conversation.messages.push(message.clone());
            conversation.updated_at = now;
            if conversation.kind.strict_turn() && !is_system {
                conversation.advance_turn();
            }
            (message, author_kind)
        };

        debug!(conversation = %conversation_id, message = %message.id, "Message added");
        self.emit(ConversationEvent::MessageAdded {
            conversation_id: conversation_id.to_string(),
            message_id: message.id.clone(),
            author_id: message.author_id.clone(),
            author_kind: author_kind.as_str().to_string(),
        })
        .await;
        Ok(message)
    }

    /// Pause an active conversation
    pub async fn pause(&self, conversation_id: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.write().await;
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
            conversation.transition(ConversationState::Paused, self.ids.now())?;
        }
        self.emit(ConversationEvent::ConversationPaused {
            conversation_id: conversation_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Resume a paused conversation
    pub async fn resume(&self, conversation_id: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.write().await;
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
            conversation.transition(ConversationState::Active, self.ids.now())?;
        }
        self.emit(ConversationEvent::ConversationResumed {
            conversation_id: conversation_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// End a conversation. A non-empty summary is appended as a final
    /// system message before the transition.
    pub async fn end_conversation(
        &self,
        conversation_id: &str,
        reason: impl Into<String>,
        summary: Option<String>,
    ) -> Result<()> {
        let reason = reason.into();
        {
            let mut conversations = self.conversations.write().await;
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
            let now = self.ids.now();
            if let Some(summary) = summary {
                if conversation.state != ConversationState::Ended {
                    let draft = MessageDraft::system(format!("Conversation ended: {summary}"));
                    let message =
                        draft.into_message(self.ids.mint(), conversation_id.to_string(), now);
                    conversation.messages.push(message);
                }
            }
            conversation.transition(ConversationState::Ended, now)?;
        }

        info!(conversation = %conversation_id, reason = %reason, "Conversation ended");
        self.emit(ConversationEvent::ConversationEnded {
            conversation_id: conversation_id.to_string(),
            reason,
        })
        .await;
        Ok(())
    }

    /// Add a participant mid-conversation; the new turn slot appends
    pub async fn join(&self, conversation_id: &str, participant_id: &str) -> Result<()> {
        if !self.participant_known(participant_id).await {
            return Err(Error::UnknownParticipant(participant_id.to_string()));
        }
        {
            let mut conversations = self.conversations.write().await;
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
            if conversation.state == ConversationState::Ended {
                return Err(Error::InvalidState(format!(
                    "conversation {conversation_id} has ended"
                )));
            }
            conversation.add_participant(participant_id);
            conversation.updated_at = self.ids.now();
        }
        self.emit(ConversationEvent::ParticipantJoined {
            conversation_id: conversation_id.to_string(),
            participant_id: participant_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Mark a participant departed.
    ///
    /// Turn indices stay stable; the slot goes inactive. Dropping
    /// below the type's minimum ends the conversation.
    pub async fn leave(&self, conversation_id: &str, participant_id: &str) -> Result<()> {
        let below_minimum = {
            let mut conversations = self.conversations.write().await;
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
            if conversation.state == ConversationState::Ended {
                return Err(Error::InvalidState(format!(
                    "conversation {conversation_id} has ended"
                )));
            }
            conversation.deactivate_participant(participant_id);
            conversation.updated_at = self.ids.now();

            let minimum = self
                .registry
                .get(conversation.kind)
                .map(|c| c.min_participants)
                .unwrap_or(1);
            // Forming conversations have no messages to lose and no
            // legal path to ended; they just wait for participants.
            conversation.state != ConversationState::Forming
                && conversation.active_participants().len() < minimum
        };

        self.emit(ConversationEvent::ParticipantLeft {
            conversation_id: conversation_id.to_string(),
            participant_id: participant_id.to_string(),
        })
        .await;

        if below_minimum {
            self.end_conversation(conversation_id, REASON_BELOW_MINIMUM, None)
                .await?;
        }
        Ok(())
    }

    /// Edit a message body; the old body joins the edit history.
    ///
    /// Only the original author or the moderator may edit.
    pub async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        editor_id: &str,
        new_body: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Message> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        if conversation.state == ConversationState::Ended {
            return Err(Error::InvalidState(format!(
                "conversation {conversation_id} has ended"
            )));
        }
        let is_moderator = conversation.moderator_id.as_deref() == Some(editor_id);
        let now = self.ids.now();
        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        if message.author_id != editor_id && !is_moderator {
            return Err(Error::Unauthorized(format!(
                "{editor_id} may not edit message {message_id}"
            )));
        }
        message.apply_edit(editor_id, new_body, reason, now);
        let updated = message.clone();
        conversation.updated_at = now;
        Ok(updated)
    }

    /// Record a vote on a message (+1 agree, -1 disagree)
    pub async fn vote(
        &self,
        conversation_id: &str,
        message_id: &str,
        principal_id: &str,
        value: i32,
    ) -> Result<i64> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        if !conversation.is_participant(principal_id) {
            return Err(Error::NotAParticipant {
                conversation: conversation_id.to_string(),
                author: principal_id.to_string(),
            });
        }
        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        message
            .votes
            .insert(principal_id.to_string(), value.signum());
        Ok(message.vote_total())
    }

    /// Toggle an emoji reaction on a message
    pub async fn react(
        &self,
        conversation_id: &str,
        message_id: &str,
        principal_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        if !conversation.is_participant(principal_id) {
            return Err(Error::NotAParticipant {
                conversation: conversation_id.to_string(),
                author: principal_id.to_string(),
            });
        }
        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        let reactors = message.reactions.entry(emoji.to_string()).or_default();
        if !reactors.insert(principal_id.to_string()) {
            reactors.remove(principal_id);
            if reactors.is_empty() {
                message.reactions.remove(emoji);
            }
        }
        Ok(())
    }

    /// Fetch a conversation snapshot
    pub async fn get(&self, conversation_id: &str) -> Result<Conversation> {
        let conversations = self.conversations.read().await;
        conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))
    }

    /// All conversations, sorted by creation time
    pub async fn list(&self) -> Vec<Conversation> {
        let conversations = self.conversations.read().await;
        let mut all: Vec<Conversation> = conversations.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Emit a protocol rejection event for a refused message
    pub(crate) async fn emit_rejection(
        &self,
        conversation_id: &str,
        author_id: &str,
        reason: &str,
    ) {
        self.emit(ConversationEvent::MessageRejected {
            conversation_id: conversation_id.to_string(),
            author_id: author_id.to_string(),
            reason: reason.to_string(),
        })
        .await;
    }

    /// Mutate a conversation's protocol scratch state
    pub(crate) async fn with_mut<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> Result<R> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        Ok(f(conversation))
    }

    /// Serialize one conversation for a journal checkpoint
    pub async fn snapshot(&self, conversation_id: &str) -> Result<serde_json::Value> {
        let conversation = self.get(conversation_id).await?;
        Ok(serde_json::to_value(&conversation).map_err(agora_replay::Error::Schema)?)
    }

    /// Rebuild state from journal snapshots (latest per conversation)
    pub async fn restore(&self, snapshots: Vec<serde_json::Value>) -> Result<usize> {
        let mut conversations = self.conversations.write().await;
        let mut restored = 0;
        for snapshot in snapshots {
            let conversation: Conversation =
                serde_json::from_value(snapshot).map_err(agora_replay::Error::Schema)?;
            conversations.insert(conversation.id.clone(), conversation);
            restored += 1;
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests;
