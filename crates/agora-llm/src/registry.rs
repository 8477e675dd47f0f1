//! Provider registry
//!
//! Read-mostly map of named providers and the models they serve. The
//! registry is the single gate for completion calls: it validates the
//! {provider, model} pair before delegating to the backend.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::{Error, Result};
use crate::provider::ChatProvider;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A provider registered under a stable id
#[derive(Clone)]
struct Registered {
    provider: Arc<dyn ChatProvider>,
    models: Arc<Vec<String>>,
    active: bool,
}

/// Registry of chat providers keyed by provider id
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, Registered>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// Register a provider under `id` with the models it serves.
    ///
    /// Re-registering an id replaces the previous entry; in-flight
    /// calls keep the provider they already resolved.
    pub fn register(
        &self,
        id: impl Into<String>,
        provider: Arc<dyn ChatProvider>,
        models: Vec<String>,
    ) {
        let id = id.into();
        info!(provider = %id, models = models.len(), "Provider registered");
        self.providers.insert(
            id,
            Registered {
                provider,
                models: Arc::new(models),
                active: true,
            },
        );
    }

    /// Mark a provider inactive without forgetting its configuration
    pub fn deactivate(&self, id: &str) -> Result<()> {
        let mut entry = self
            .providers
            .get_mut(id)
            .ok_or_else(|| Error::NotConfigured(id.to_string()))?;
        entry.active = false;
        Ok(())
    }

    /// Resolve an active provider by id
    pub fn get(&self, id: &str) -> Result<Arc<dyn ChatProvider>> {
        let entry = self
            .providers
            .get(id)
            .ok_or_else(|| Error::NotConfigured(id.to_string()))?;
        if !entry.active {
            return Err(Error::NotConfigured(id.to_string()));
        }
        Ok(Arc::clone(&entry.provider))
    }

    /// Models registered for a provider
    pub fn models(&self, id: &str) -> Result<Vec<String>> {
        let entry = self
            .providers
            .get(id)
            .ok_or_else(|| Error::NotConfigured(id.to_string()))?;
        Ok(entry.models.as_ref().clone())
    }

    /// Registered provider ids, active ones only
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .providers
            .iter()
            .filter(|e| e.active)
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Validate that `model` is served by provider `id`
    pub fn validate(&self, id: &str, model: &str) -> Result<()> {
        let entry = self
            .providers
            .get(id)
            .ok_or_else(|| Error::NotConfigured(id.to_string()))?;
        if !entry.active {
            return Err(Error::NotConfigured(id.to_string()));
        }
        if !entry.models.iter().any(|m| m == model) {
            return Err(Error::UnknownModel {
                provider: id.to_string(),
                model: model.to_string(),
            });
        }
        Ok(())
    }

    /// Validate the request target and complete through the provider
    pub async fn complete(
        &self,
        provider_id: &str,
        request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.validate(provider_id, &request.model)?;
        let provider = self.get(provider_id)?;
        debug!(provider = %provider_id, model = %request.model, "Dispatching completion");
        provider.complete(request).await
    }
}
