//! Agora LLM - Provider Abstraction
//!
//! This crate provides model backends for Agora:
//! - Provider: the `ChatProvider` trait every backend implements
//! - Registry: named providers with model validation
//! - OpenRouter: OpenAI-compatible HTTP gateway provider
//! - Mock: scripted provider for tests
//! - Secret: credential references resolved at request time

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod message;
pub mod mock;
pub mod openrouter;
pub mod provider;
pub mod registry;
pub mod secret;

pub use completion::{CompletionRequest, CompletionResponse, TokenUsage, DEFAULT_DEADLINE};
pub use error::{Error, Result};
pub use message::{ChatMessage, ChatRole};
pub use mock::MockProvider;
pub use openrouter::{OpenRouterConfig, OpenRouterProvider};
pub use provider::ChatProvider;
pub use registry::ProviderRegistry;
pub use secret::{EnvSecretResolver, SecretResolver, SecureString, StaticSecretResolver};
