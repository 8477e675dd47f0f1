//! Typed publish/subscribe event bus
//!
//! Everything observable about the hub flows through here: the UI,
//! the journal recorder and tests all subscribe rather than hook into
//! managers directly.

mod bus;
mod types;

pub use bus::{DropPolicy, EventBus, Subscription};
pub use types::{AgentEvent, ConversationEvent, EventBody, EventFamily, FileEvent, HubEvent};
