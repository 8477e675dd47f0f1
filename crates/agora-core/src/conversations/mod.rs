//! Conversations: types, state machines, turn order and the manager

mod manager;
mod message;
mod state;
mod types;

pub use manager::{ConversationManager, REASON_BELOW_MINIMUM};
pub use message::{AuthorKind, EditRecord, Message, MessageDraft};
pub use state::{Conversation, ConversationState, ProtocolState, TurnEntry};
pub use types::{ConversationKind, ProtocolSettings, TypeConfig, TypeRegistry};
