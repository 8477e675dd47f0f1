//! Provider prefix assembly
//!
//! The router is the only component that builds provider prefixes.
//! A prefix is the agent's system preamble followed by the
//! conversation history, bounded by the type's history limit, with
//! attachments flattened to one-line references.

use crate::agents::Agent;
use crate::conversations::Conversation;
use agora_llm::{ChatMessage, ChatRole};
use std::collections::HashMap;

/// Options shaping one prefix
#[derive(Debug, Clone, Default)]
pub struct PrefixOptions {
    /// Bound on history entries; `None` means the full history
    pub history_limit: Option<usize>,
    /// Replace author names with stable anonymous labels
    pub anonymize: bool,
    /// Extra protocol instruction appended to the preamble
    pub instruction: Option<String>,
}

/// Build the system preamble for an agent in a conversation
#[must_use]
pub fn preamble(agent: &Agent, conversation: &Conversation) -> String {
    let mut text = format!(
        "You are {}, a {} {} taking part in a {} conversation about \"{}\".",
        agent.display_name,
        agent.personality.as_str(),
        agent.role.as_str(),
        conversation.kind,
        conversation.subject,
    );
    if !agent.capabilities.is_empty() {
        let tags: Vec<&str> = agent.capabilities.iter().map(|c| c.as_str()).collect();
        text.push_str(&format!(" Your declared capabilities: {}.", tags.join(", ")));
    }
    text
}

/// Build the full provider prefix for `agent`
#[must_use]
pub fn build_prefix(
    conversation: &Conversation,
    agent: &Agent,
    options: &PrefixOptions,
) -> Vec<ChatMessage> {
    let mut system = preamble(agent, conversation);
    if let Some(instruction) = &options.instruction {
        system.push(' ');
        system.push_str(instruction);
    }

    let mut prefix = vec![ChatMessage {
        role: ChatRole::System,
        content: system,
    }];

    let labels = anonymous_labels(conversation);
    let history: Vec<&crate::conversations::Message> = match options.history_limit {
        Some(limit) => {
            let skip = conversation.messages.len().saturating_sub(limit);
            conversation.messages.iter().skip(skip).collect()
        }
        None => conversation.messages.iter().collect(),
    };

    for message in history {
        if message.author_id == agent.id {
            prefix.push(ChatMessage::assistant(message.body.clone()));
            continue;
        }
        let label = if options.anonymize {
            labels
                .get(message.author_id.as_str())
                .cloned()
                .unwrap_or_else(|| "participant".to_string())
        } else {
            message.author_id.clone()
        };
        let mut content = format!("[{label}] {}", message.body);
        for reference in attachment_references(&message.metadata) {
            content.push('\n');
            content.push_str(&reference);
        }
        prefix.push(ChatMessage::user(content));
    }
    prefix
}

/// Stable anonymous labels keyed by turn-order slot, so the same
/// author maps to the same label across one conversation.
fn anonymous_labels(conversation: &Conversation) -> HashMap<&str, String> {
    conversation
        .turn_order
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.participant_id.as_str(), format!("participant-{}", i + 1)))
        .collect()
}

/// Flatten attachment metadata to one-line references.
///
/// Attachments are declared as `metadata.attachments`, an array of
/// `{id, name}` objects.
fn attachment_references(metadata: &HashMap<String, serde_json::Value>) -> Vec<String> {
    let Some(attachments) = metadata.get("attachments").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    attachments
        .iter()
        .map(|a| {
            let name = a.get("name").and_then(|v| v.as_str()).unwrap_or("file");
            let id = a.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
            format!("[file: {name} ({id})]")
        })
        .collect()
}
