//! Message router
//!
//! The router owns every protocol-specific rule: who may speak, which
//! agents answer a message, what their provider prefixes look like,
//! and how provider failures surface. It is the only component that
//! branches on the conversation type tag and the only one that talks
//! to providers.

mod prompt;

pub use prompt::{build_prefix, preamble, PrefixOptions};

use crate::agents::{Agent, AgentManager, AgentRole, TaskRequest};
use crate::config::RetryConfig;
use crate::conversations::{
    AuthorKind, Conversation, ConversationKind, ConversationManager, Message, MessageDraft,
};
use crate::error::{Error, Result};
use crate::id::IdGenerator;
use agora_llm::{CompletionRequest, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Rejection reason tags carried by `message_rejected` events
pub mod rejection {
    /// Socratic: the moderator's utterance was not a question
    pub const NON_QUESTION_FROM_MODERATOR: &str = "NonQuestionFromModerator";
    /// Socratic: follow-up depth limit reached
    pub const FOLLOWUP_LIMIT_REACHED: &str = "FollowupLimitReached";
    /// Brainstorm: critique submitted during the divergent phase
    pub const CRITIQUE_IN_DIVERGENT_PHASE: &str = "CritiqueInDivergentPhase";
    /// Debate: submission landed outside its timing window
    pub const LATE_SUBMISSION: &str = "LateSubmission";
    /// Peer review: a reviewer targeted their own submission
    pub const REVIEWER_IS_AUTHOR: &str = "ReviewerIsAuthor";
}

/// Conversation-end reason tags
pub mod end_reason {
    /// Consensus threshold met
    pub const CONSENSUS_REACHED: &str = "ConsensusReached";
    /// Consensus round bound exhausted
    pub const MAX_ROUNDS_REACHED: &str = "MaxRoundsReached";
}

/// Outcome of submitting a draft through the router
#[derive(Debug)]
pub enum Submission {
    /// Messages appended, trigger first, then responses in order
    Appended(Vec<Message>),
    /// Held for later delivery (hierarchical moderator gate)
    Held,
    /// Silently refused; the tag names why
    Dropped(&'static str),
}

enum Verdict {
    Accept,
    Hold,
    Drop(&'static str),
}

/// Routes messages through the active conversation protocol
pub struct MessageRouter {
    conversations: Arc<ConversationManager>,
    agents: Arc<AgentManager>,
    providers: Arc<ProviderRegistry>,
    retry: RetryConfig,
    default_deadline: Duration,
    ids: Arc<IdGenerator>,
}

impl MessageRouter {
    /// Create a router
    #[must_use]
    pub fn new(
        conversations: Arc<ConversationManager>,
        agents: Arc<AgentManager>,
        providers: Arc<ProviderRegistry>,
        retry: RetryConfig,
        default_deadline: Duration,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            conversations,
            agents,
            providers,
            retry,
            default_deadline,
            ids,
        }
    }

    /// Submit a draft: protocol admission, append, held-queue flush,
    /// then agent dispatch.
    ///
    /// Every message appended during the call is returned in append
    /// order. Protocol refusals emit a `message_rejected` event; hard
    /// refusals also return the matching error.
    pub async fn submit(&self, conversation_id: &str, draft: MessageDraft) -> Result<Submission> {
        let conversation = self.conversations.get(conversation_id).await?;

        match self.admit(&conversation, &draft).await? {
            Verdict::Drop(reason) => {
                self.conversations
                    .emit_rejection(conversation_id, &draft.author_id, reason)
                    .await;
                debug!(conversation = %conversation_id, reason, "Message silently dropped");
                return Ok(Submission::Dropped(reason));
            }
            Verdict::Hold => {
                self.conversations
                    .with_mut(conversation_id, |c| c.protocol.held_drafts.push(draft))
                    .await?;
                return Ok(Submission::Held);
            }
            Verdict::Accept => {}
        }

        let is_moderator = conversation.moderator_id.as_deref() == Some(draft.author_id.as_str());
        let author_kind = draft.author_kind;
        let message = self
            .conversations
            .add_message(conversation_id, draft)
            .await?;
        self.after_append(&conversation, &message, is_moderator)
            .await?;

        let mut appended = vec![message.clone()];

        // A moderator turn releases everything held behind the gate.
        if conversation.kind == ConversationKind::Hierarchical && is_moderator {
            let held = self
                .conversations
                .with_mut(conversation_id, |c| {
                    std::mem::take(&mut c.protocol.held_drafts)
                })
                .await?;
            for draft in held {
                appended.push(
                    self.conversations
                        .add_message(conversation_id, draft)
                        .await?,
                );
            }
        }

        if author_kind == AuthorKind::User || is_moderator {
            appended.extend(self.respond(conversation_id, &message).await?);
        }
        Ok(Submission::Appended(appended))
    }

    /// Protocol admission rules, applied before the append.
    async fn admit(&self, conversation: &Conversation, draft: &MessageDraft) -> Result<Verdict> {
        if draft.author_kind == AuthorKind::System {
            return Ok(Verdict::Accept);
        }
        let is_moderator = conversation.moderator_id.as_deref() == Some(draft.author_id.as_str());

        match conversation.kind {
            ConversationKind::Socratic if is_moderator => {
                if !draft.body.trim_end().ends_with('?') {
                    self.conversations
                        .emit_rejection(
                            &conversation.id,
                            &draft.author_id,
                            rejection::NON_QUESTION_FROM_MODERATOR,
                        )
                        .await;
                    return Err(Error::InvalidState(
                        "socratic moderator utterances must be questions".to_string(),
                    ));
                }
                let asked_before = conversation
                    .messages_by(&draft.author_id)
                    .iter()
                    .any(|m| m.author_kind != AuthorKind::System);
                if asked_before
                    && conversation.protocol.followup_depth
                        >= conversation.settings.max_followups()
                {
                    self.conversations
                        .emit_rejection(
                            &conversation.id,
                            &draft.author_id,
                            rejection::FOLLOWUP_LIMIT_REACHED,
                        )
                        .await;
                    return Err(Error::InvalidState(format!(
                        "follow-up limit of {} reached",
                        conversation.settings.max_followups()
                    )));
                }
                Ok(Verdict::Accept)
            }
            ConversationKind::Brainstorm => {
                let is_critique = draft
                    .metadata
                    .get("critique")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if is_critique && !conversation.protocol.convergent_phase {
                    self.conversations
                        .emit_rejection(
                            &conversation.id,
                            &draft.author_id,
                            rejection::CRITIQUE_IN_DIVERGENT_PHASE,
                        )
                        .await;
                    return Err(Error::InvalidState(
                        "critiques are not allowed during the divergent phase".to_string(),
                    ));
                }
                Ok(Verdict::Accept)
            }
            ConversationKind::Debate if !is_moderator => {
                if let Some(opened) = conversation.protocol.window_opened_at {
                    let is_rebuttal = draft
                        .metadata
                        .get("rebuttal")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let window = if is_rebuttal {
                        conversation.settings.rebuttal_time_seconds()
                    } else {
                        conversation.settings.speaking_time_seconds()
                    };
                    let elapsed = (self.ids.now() - opened).num_seconds().max(0) as u64;
                    if elapsed > window {
                        return Ok(Verdict::Drop(rejection::LATE_SUBMISSION));
                    }
                }
                Ok(Verdict::Accept)
            }
            ConversationKind::PeerReview => {
                if let Some(target_id) = draft.metadata.get("review_of").and_then(|v| v.as_str()) {
                    let target_author = conversation
                        .messages
                        .iter()
                        .find(|m| m.id == target_id)
                        .map(|m| m.author_id.clone())
                        .ok_or_else(|| Error::NotFound(format!("message {target_id}")))?;
                    if target_author == draft.author_id {
                        self.conversations
                            .emit_rejection(
                                &conversation.id,
                                &draft.author_id,
                                rejection::REVIEWER_IS_AUTHOR,
                            )
                            .await;
                        return Err(Error::InvalidState(
                            "reviewers may not review their own submission".to_string(),
                        ));
                    }
                }
                Ok(Verdict::Accept)
            }
            ConversationKind::Hierarchical if !is_moderator => Ok(Verdict::Hold),
            _ => Ok(Verdict::Accept),
        }
    }

    /// Protocol bookkeeping after an accepted append.
    async fn after_append(
        &self,
        conversation: &Conversation,
        message: &Message,
        is_moderator: bool,
    ) -> Result<()> {
        match conversation.kind {
            ConversationKind::Socratic if is_moderator => {
                let asked_before = conversation
                    .messages_by(&message.author_id)
                    .iter()
                    .any(|m| m.author_kind != AuthorKind::System);
                if asked_before {
                    self.conversations
                        .with_mut(&conversation.id, |c| c.protocol.followup_depth += 1)
                        .await?;
                }
            }
            ConversationKind::Brainstorm => {
                let to_convergent = message
                    .metadata
                    .get("phase")
                    .and_then(|v| v.as_str())
                    .is_some_and(|p| p == "convergent");
                let may_flip = is_moderator || message.author_id == conversation.creator_id;
                if to_convergent && may_flip {
                    self.conversations
                        .with_mut(&conversation.id, |c| c.protocol.convergent_phase = true)
                        .await?;
                }
            }
            ConversationKind::Debate => {
                let now = self.ids.now();
                self.conversations
                    .with_mut(&conversation.id, |c| c.protocol.window_opened_at = Some(now))
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Derive and dispatch the agent responses a trigger message calls
    /// for under the conversation's protocol.
    async fn respond(&self, conversation_id: &str, trigger: &Message) -> Result<Vec<Message>> {
        let conversation = self.conversations.get(conversation_id).await?;
        match conversation.kind {
            ConversationKind::Democratic => self.respond_democratic(&conversation, trigger).await,
            ConversationKind::Ensemble => self.respond_ensemble(&conversation, trigger).await,
            ConversationKind::Hierarchical => {
                self.respond_hierarchical(&conversation, trigger).await
            }
            ConversationKind::Competitive => self.respond_competitive(&conversation, trigger).await,
            ConversationKind::Specialist => self.respond_specialist(&conversation, trigger).await,
            ConversationKind::Consensus => self.respond_consensus(&conversation, trigger).await,
            ConversationKind::Brainstorm => self.respond_brainstorm(&conversation, trigger).await,
            ConversationKind::Debate => self.respond_debate(&conversation, trigger).await,
            ConversationKind::PeerReview => self.respond_peer_review(&conversation, trigger).await,
            ConversationKind::Socratic => self.respond_socratic(&conversation, trigger).await,
        }
    }

    /// Active agent participants in turn order, minus the trigger author
    async fn agent_recipients(&self, conversation: &Conversation, trigger: &Message) -> Vec<Agent> {
        let mut recipients = Vec::new();
        for entry in &conversation.turn_order {
            if !entry.active || entry.participant_id == trigger.author_id {
                continue;
            }
            if conversation.moderator_id.as_deref() == Some(entry.participant_id.as_str()) {
                continue;
            }
            if let Ok(agent) = self.agents.get(&entry.participant_id).await {
                if agent.is_active {
                    recipients.push(agent);
                }
            }
        }
        recipients
    }

    async fn respond_democratic(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        let recipients = self.agent_recipients(conversation, trigger).await;
        let is_proposal = trigger.body.to_lowercase().starts_with("proposal:")
            || trigger
                .metadata
                .get("proposal")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
        let instruction = is_proposal.then(|| {
            format!(
                "A proposal is on the table (vote closes in {} seconds). \
                 Start your reply with 'agree' or 'disagree', then explain.",
                conversation.settings.vote_timeout_seconds()
            )
        });

        // One round: every recipient answers the same prefix, appended
        // in turn order.
        let mut appended = Vec::new();
        let mut agrees = 0usize;
        let mut votes = 0usize;
        for agent in &recipients {
            let options = PrefixOptions {
                history_limit: conversation.settings.history_limit,
                instruction: instruction.clone(),
                ..Default::default()
            };
            let prefix = build_prefix(conversation, agent, &options);
            let outcome = self
                .dispatch(&conversation.id, agent, "chat_response", prefix)
                .await?;
            if is_proposal {
                if let Some(vote) = parse_vote(&outcome.body_if_agent()) {
                    votes += 1;
                    if vote {
                        agrees += 1;
                    }
                    self.conversations
                        .vote(
                            &conversation.id,
                            &trigger.id,
                            &agent.id,
                            if vote { 1 } else { -1 },
                        )
                        .await?;
                }
            }
            appended.push(outcome.message);
        }

        if is_proposal && votes > 0 {
            let passed = agrees * 2 > recipients.len();
            let verdict = if passed { "passed" } else { "failed" };
            let draft = MessageDraft::system(format!(
                "Vote closed: proposal {verdict} ({agrees} of {} in favor)",
                recipients.len()
            ))
            .with_metadata("proposal_id", serde_json::json!(trigger.id))
            .with_metadata("passed", serde_json::json!(passed));
            appended.push(self.conversations.add_message(&conversation.id, draft).await?);
        }
        Ok(appended)
    }

    async fn respond_ensemble(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        let recipients = self.agent_recipients(conversation, trigger).await;
        let synthesizer = recipients
            .iter()
            .find(|a| a.role == AgentRole::Synthesizer)
            .or_else(|| recipients.first())
            .cloned();
        let Some(synthesizer) = synthesizer else {
            return Ok(Vec::new());
        };

        let mut appended = Vec::new();
        for agent in recipients.iter().filter(|a| a.id != synthesizer.id) {
            let options = PrefixOptions {
                history_limit: conversation.settings.history_limit,
                ..Default::default()
            };
            let prefix = build_prefix(conversation, agent, &options);
            appended.push(
                self.dispatch(&conversation.id, agent, "ensemble_answer", prefix)
                    .await?
                    .message,
            );
        }

        for round in 1..=conversation.settings.refinement_rounds() {
            let current = self.conversations.get(&conversation.id).await?;
            let options = PrefixOptions {
                history_limit: current.settings.history_limit,
                instruction: Some(format!(
                    "Refine the answers so far into one improved answer (refinement pass {round})."
                )),
                ..Default::default()
            };
            let prefix = build_prefix(&current, &synthesizer, &options);
            appended.push(
                self.dispatch(&conversation.id, &synthesizer, "ensemble_synthesis", prefix)
                    .await?
                    .message,
            );
        }
        Ok(appended)
    }

    async fn respond_hierarchical(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        // Only an explicit moderator designation dispatches anyone.
        let Some(next) = trigger.metadata.get("next_speaker").and_then(|v| v.as_str()) else {
            return Ok(Vec::new());
        };
        if !conversation.is_active_participant(next) {
            return Err(Error::NotAParticipant {
                conversation: conversation.id.clone(),
                author: next.to_string(),
            });
        }
        let agent = self.agents.get(next).await?;
        let current = self.conversations.get(&conversation.id).await?;
        let options = PrefixOptions {
            history_limit: current.settings.history_limit,
            instruction: Some("The moderator has given you the floor.".to_string()),
            ..Default::default()
        };
        let prefix = build_prefix(&current, &agent, &options);
        let outcome = self
            .dispatch(&conversation.id, &agent, "chat_response", prefix)
            .await?;
        Ok(vec![outcome.message])
    }

    async fn respond_competitive(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        let recipients = self.agent_recipients(conversation, trigger).await;
        let mut appended = Vec::new();
        let mut scored: Vec<(String, usize)> = Vec::new();

        // Contestants answer the same prompt without seeing each other:
        // every prefix is built from the pre-response snapshot.
        for agent in &recipients {
            let options = PrefixOptions {
                history_limit: conversation.settings.history_limit,
                instruction: Some(format!(
                    "Give your single best answer. You have {} seconds.",
                    conversation.settings.time_limit_seconds()
                )),
                ..Default::default()
            };
            let prefix = build_prefix(conversation, agent, &options);
            let outcome = self
                .dispatch(&conversation.id, agent, "competitive_answer", prefix)
                .await?;
            if outcome.is_agent {
                scored.push((agent.id.clone(), outcome.message.body.chars().count()));
            }
            appended.push(outcome.message);
        }

        if !scored.is_empty() {
            scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let ranking = scored
                .iter()
                .enumerate()
                .map(|(i, (id, score))| format!("{}. {id} (score {score})", i + 1))
                .collect::<Vec<_>>()
                .join("; ");
            let draft = MessageDraft::system(format!("Scoring complete: {ranking}"))
                .with_metadata("winner", serde_json::json!(scored[0].0));
            appended.push(self.conversations.add_message(&conversation.id, draft).await?);
        }
        Ok(appended)
    }

    async fn respond_specialist(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        let declared: Vec<String> = trigger
            .metadata
            .get("capabilities")
            .and_then(|v| v.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let recipients = self.agent_recipients(conversation, trigger).await;
        let matching: Vec<Agent> = if declared.is_empty() {
            recipients
        } else {
            recipients
                .into_iter()
                .filter(|a| {
                    a.capabilities
                        .iter()
                        .any(|c| declared.iter().any(|d| d == c.as_str()))
                })
                .collect()
        };

        let mut appended = Vec::new();
        for agent in &matching {
            let options = PrefixOptions {
                history_limit: conversation.settings.history_limit,
                instruction: Some("Answer within your declared specialty.".to_string()),
                ..Default::default()
            };
            let prefix = build_prefix(conversation, agent, &options);
            appended.push(
                self.dispatch(&conversation.id, agent, "specialist_answer", prefix)
                    .await?
                    .message,
            );
        }
        Ok(appended)
    }

    async fn respond_consensus(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        let voters = self.agent_recipients(conversation, trigger).await;
        if voters.is_empty() {
            return Ok(Vec::new());
        }
        let threshold = conversation.settings.consensus_threshold();
        let max_rounds = conversation.settings.max_rounds();
        let mut appended = Vec::new();

        loop {
            let round = self
                .conversations
                .with_mut(&conversation.id, |c| {
                    c.protocol.consensus_rounds += 1;
                    c.protocol.consensus_rounds
                })
                .await?;

            let mut agrees = 0usize;
            for agent in &voters {
                let current = self.conversations.get(&conversation.id).await?;
                let options = PrefixOptions {
                    history_limit: current.settings.history_limit,
                    instruction: Some(format!(
                        "Consensus round {round}: start your reply with 'agree' or 'disagree'."
                    )),
                    ..Default::default()
                };
                let prefix = build_prefix(&current, agent, &options);
                let outcome = self
                    .dispatch(&conversation.id, agent, "consensus_vote", prefix)
                    .await?;
                // Abstentions and unparseable votes count as disagreement.
                if parse_vote(&outcome.body_if_agent()) == Some(true) {
                    agrees += 1;
                }
                appended.push(outcome.message);
            }

            let ratio = agrees as f64 / voters.len() as f64;
            debug!(conversation = %conversation.id, round, ratio, "Consensus round tallied");
            if ratio >= threshold {
                self.conversations
                    .end_conversation(
                        &conversation.id,
                        end_reason::CONSENSUS_REACHED,
                        Some(format!(
                            "consensus reached in round {round} ({agrees}/{} agreed)",
                            voters.len()
                        )),
                    )
                    .await?;
                return Ok(appended);
            }
            if round >= max_rounds {
                self.conversations
                    .end_conversation(
                        &conversation.id,
                        end_reason::MAX_ROUNDS_REACHED,
                        Some(format!("no consensus after {round} rounds")),
                    )
                    .await?;
                return Ok(appended);
            }
        }
    }

    async fn respond_brainstorm(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        let recipients = self.agent_recipients(conversation, trigger).await;
        let convergent = self
            .conversations
            .get(&conversation.id)
            .await?
            .protocol
            .convergent_phase;
        let instruction = if convergent {
            "Convergent phase: critique and rank the ideas gathered so far."
        } else {
            "Divergent phase: contribute new ideas. Do not critique other ideas yet."
        };

        let mut appended = Vec::new();
        for agent in &recipients {
            let options = PrefixOptions {
                history_limit: conversation.settings.history_limit,
                instruction: Some(instruction.to_string()),
                ..Default::default()
            };
            let prefix = build_prefix(conversation, agent, &options);
            appended.push(
                self.dispatch(&conversation.id, agent, "brainstorm_idea", prefix)
                    .await?
                    .message,
            );
        }
        Ok(appended)
    }

    async fn respond_debate(
        &self,
        conversation: &Conversation,
        _trigger: &Message,
    ) -> Result<Vec<Message>> {
        let current = self.conversations.get(&conversation.id).await?;
        let Some(speaker) = current.current_speaker().map(str::to_string) else {
            return Ok(Vec::new());
        };
        if current.moderator_id.as_deref() == Some(speaker.as_str()) {
            return Ok(Vec::new());
        }
        let Ok(agent) = self.agents.get(&speaker).await else {
            return Ok(Vec::new());
        };
        let options = PrefixOptions {
            history_limit: current.settings.history_limit,
            instruction: Some(format!(
                "It is your speaking window ({} seconds). Make your case.",
                current.settings.speaking_time_seconds()
            )),
            ..Default::default()
        };
        let prefix = build_prefix(&current, &agent, &options);
        let outcome = self
            .dispatch(&conversation.id, &agent, "debate_statement", prefix)
            .await?;
        Ok(vec![outcome.message])
    }

    async fn respond_peer_review(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        let reviewers = self.agent_recipients(conversation, trigger).await;
        let mut appended = Vec::new();
        let mut submissions: Vec<Message> = Vec::new();

        for agent in &reviewers {
            let options = PrefixOptions {
                history_limit: conversation.settings.history_limit,
                anonymize: true,
                instruction: Some("Write your submission on the subject.".to_string()),
                ..Default::default()
            };
            let prefix = build_prefix(conversation, agent, &options);
            let outcome = self
                .dispatch(&conversation.id, agent, "peer_review_submission", prefix)
                .await?;
            if outcome.is_agent {
                submissions.push(outcome.message.clone());
            }
            appended.push(outcome.message);
        }

        if submissions.len() < 2 {
            return Ok(appended);
        }

        // Rotate assignments: reviewer i gets submission i+1, which can
        // never be their own.
        for (i, submission) in submissions.iter().enumerate() {
            let target = &submissions[(i + 1) % submissions.len()];
            let reviewer_id = submission.author_id.clone();
            let Ok(reviewer) = self.agents.get(&reviewer_id).await else {
                continue;
            };
            let current = self.conversations.get(&conversation.id).await?;
            let options = PrefixOptions {
                history_limit: current.settings.history_limit,
                anonymize: true,
                instruction: Some(
                    "Review the submission quoted at the end. Be constructive and specific."
                        .to_string(),
                ),
                ..Default::default()
            };
            let mut prefix = build_prefix(&current, &reviewer, &options);
            prefix.push(agora_llm::ChatMessage::user(format!(
                "[review target] {}",
                target.body
            )));

            let task = self
                .agents
                .assign_task(
                    TaskRequest::new("peer_review", "review a submission")
                        .with_assignee(&reviewer.id),
                )
                .await?;
            self.agents.start_task(&task.id).await?;
            let outcome = self
                .execute(&current.id, &reviewer, &task.id, prefix, |draft| {
                    draft
                        .with_metadata("review_of", serde_json::json!(target.id))
                        .with_parent(target.id.clone())
                })
                .await?;
            appended.push(outcome.message);
        }
        Ok(appended)
    }

    async fn respond_socratic(
        &self,
        conversation: &Conversation,
        trigger: &Message,
    ) -> Result<Vec<Message>> {
        // Only moderator questions fan out to the answerers.
        if conversation.moderator_id.as_deref() != Some(trigger.author_id.as_str()) {
            return Ok(Vec::new());
        }
        let recipients = self.agent_recipients(conversation, trigger).await;
        let mut appended = Vec::new();
        for agent in &recipients {
            let options = PrefixOptions {
                history_limit: conversation.settings.history_limit,
                instruction: Some("Answer the moderator's question directly.".to_string()),
                ..Default::default()
            };
            let prefix = build_prefix(conversation, agent, &options);
            appended.push(
                self.dispatch(&conversation.id, agent, "socratic_answer", prefix)
                    .await?
                    .message,
            );
        }
        Ok(appended)
    }

    /// Create and start a task for `agent`, then execute the provider
    /// call with retry.
    async fn dispatch(
        &self,
        conversation_id: &str,
        agent: &Agent,
        task_type: &str,
        prefix: Vec<agora_llm::ChatMessage>,
    ) -> Result<DispatchOutcome> {
        let task = self
            .agents
            .assign_task(
                TaskRequest::new(task_type, format!("respond in conversation {conversation_id}"))
                    .with_assignee(&agent.id),
            )
            .await?;
        self.agents.start_task(&task.id).await?;
        self.execute(conversation_id, agent, &task.id, prefix, |draft| draft)
            .await
    }

    /// Provider call with the configured retry schedule.
    ///
    /// Exactly one message is appended per dispatched request: the
    /// agent's response on success, a system notice on terminal
    /// failure. Transient failures (timeout, transport, rate limit)
    /// retry with exponential backoff; auth and context errors
    /// surface immediately.
    async fn execute(
        &self,
        conversation_id: &str,
        agent: &Agent,
        task_id: &str,
        prefix: Vec<agora_llm::ChatMessage>,
        decorate: impl FnOnce(MessageDraft) -> MessageDraft,
    ) -> Result<DispatchOutcome> {
        let request = CompletionRequest::new(agent.model_id.clone())
            .with_messages(prefix)
            .with_max_tokens(agent.max_tokens)
            .with_temperature(agent.temperature)
            .with_deadline(self.default_deadline)
            .with_idempotency_key(task_id);

        let mut attempt = 1u32;
        let result = loop {
            match self
                .providers
                .complete(&agent.provider_id, request.clone())
                .await
            {
                Ok(response) => break Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        agent = %agent.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(response) => {
                let draft = decorate(MessageDraft::agent(&agent.id, response.content.clone()));
                let message = self.conversations.add_message(conversation_id, draft).await?;
                self.agents
                    .complete_task(task_id, response.content, None)
                    .await?;
                Ok(DispatchOutcome {
                    message,
                    is_agent: true,
                })
            }
            Err(e) => {
                let provider_error = Error::Provider(e);
                let kind = provider_error.kind();
                warn!(agent = %agent.id, kind, "Provider call failed terminally");
                let draft = MessageDraft::system(format!(
                    "{} did not respond: {provider_error}",
                    agent.display_name
                ))
                .with_metadata("kind", serde_json::json!(kind))
                .with_metadata("agent_id", serde_json::json!(agent.id))
                .with_metadata("task_id", serde_json::json!(task_id));
                let message = self.conversations.add_message(conversation_id, draft).await?;
                // A failed speaker still consumes its slot under strict
                // turn order, otherwise the round wedges.
                let strict = self
                    .conversations
                    .get(conversation_id)
                    .await
                    .map(|c| c.kind.strict_turn())
                    .unwrap_or(false);
                if strict {
                    self.conversations
                        .with_mut(conversation_id, |c| {
                            if c.current_speaker() == Some(agent.id.as_str()) {
                                c.advance_turn();
                            }
                        })
                        .await?;
                }
                self.agents
                    .fail_task(task_id, provider_error.to_string())
                    .await?;
                Ok(DispatchOutcome {
                    message,
                    is_agent: false,
                })
            }
        }
    }
}

struct DispatchOutcome {
    message: Message,
    is_agent: bool,
}

impl DispatchOutcome {
    /// The body when an agent answered, empty otherwise
    fn body_if_agent(&self) -> String {
        if self.is_agent {
            self.message.body.clone()
        } else {
            String::new()
        }
    }
}

/// Parse an agree/disagree vote from a response body
fn parse_vote(body: &str) -> Option<bool> {
    let lower = body.trim().to_lowercase();
    if lower.starts_with("disagree") {
        Some(false)
    } else if lower.starts_with("agree") {
        Some(true)
    } else {
        None
    }
}

#[cfg(test)]
mod tests;
