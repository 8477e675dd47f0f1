//! Agora Core - Conversation Engine
//!
//! This crate provides the core runtime of the Agora hub:
//! - Id: process-wide id minting and monotonic time
//! - Event bus: typed pub/sub with bounded subscriber buffers
//! - Agents: the fleet, its task queue and distribution strategies
//! - Conversations: type registry, state machines and turn order
//! - Router: protocol enforcement and provider dispatch
//! - Controller: the `Hub` facade user intents enter through

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agents;
pub mod config;
pub mod controller;
pub mod conversations;
pub mod error;
pub mod event_bus;
pub mod id;
pub mod router;

pub use agents::{
    Agent, AgentManager, AgentPersonality, AgentRole, AgentSpec, Capability,
    DistributionStrategy, LeastLoaded, PerformanceCounters, PerformanceWeighted, Task,
    TaskRequest, TaskStatus,
};
pub use config::{
    AgentConfig, EventBusConfig, FileConfig, HubConfig, JournalConfig, ProviderConfig, RetryConfig,
};
pub use controller::{appended_messages, Hub};
pub use conversations::{
    AuthorKind, Conversation, ConversationKind, ConversationManager, ConversationState,
    EditRecord, Message, MessageDraft, ProtocolSettings, TypeConfig, TypeRegistry,
};
pub use error::{Error, Result};
pub use event_bus::{
    AgentEvent, ConversationEvent, DropPolicy, EventBody, EventBus, EventFamily, FileEvent,
    HubEvent, Subscription,
};
pub use id::{IdGenerator, MonotonicClock};
pub use router::{MessageRouter, PrefixOptions, Submission};
