// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider catalog
//!
//! Owns the known model configurations and the active one, and dispatches
//! completions to the active model's transport.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::{AiProvider, ConfigurationStore, ProviderConfiguration};
use crate::conversation::ChatMessage;
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{AiderError, ApiError, Result};
use crate::events::{ActiveModelChanged, EventRegistry};
use crate::llm::known_models;
use crate::llm::provider::{
    ChatResponse, CompletionRequest, CompletionResponse, ConnectionTestResult, ProviderTransport,
};
use crate::llm::registry::ProviderRegistry;
use crate::llm::retry::{with_retry, Backoff};

const SOURCE: &str = "ProviderCatalog";

/// Catalog of model configurations with a single active model.
///
/// Switching the active model is serialized; readers always see either the
/// old or the new configuration, never a mix.
pub struct ProviderCatalog {
    store: Arc<dyn ConfigurationStore>,
    registry: ProviderRegistry,
    diagnostics: Arc<dyn Diagnostics>,
    backoff: Backoff,
    configurations: RwLock<Vec<ProviderConfiguration>>,
    active: RwLock<Option<ProviderConfiguration>>,
    /// Held for the whole of every active-model mutation
    switch_lock: Mutex<()>,
    active_model_changed: EventRegistry<ActiveModelChanged>,
}

impl ProviderCatalog {
    /// Create an empty catalog; call [`initialize`](Self::initialize) to load it
    pub fn new(store: Arc<dyn ConfigurationStore>, registry: ProviderRegistry) -> Self {
        Self {
            store,
            registry,
            diagnostics: Arc::new(TracingDiagnostics),
            backoff: Backoff::default(),
            configurations: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            switch_lock: Mutex::new(()),
            active_model_changed: EventRegistry::new(),
        }
    }

    /// Report through `diagnostics` instead of plain tracing
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Delay policy between dispatch retries
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Load configurations and restore the recorded active model.
    ///
    /// A recorded id that is missing, disabled or invalid leaves no model
    /// active; that is not an error.
    pub async fn initialize(&self) -> Result<()> {
        let _switch = self.switch_lock.lock().await;

        let configurations = self.store.get_all_model_configurations().await?;
        let active_id = self.store.get_active_model_id().await?;

        let active = active_id.and_then(|id| {
            configurations
                .iter()
                .find(|c| c.id == id && c.is_enabled && c.is_valid())
                .cloned()
        });

        if let (Some(id), None) = (active_id, &active) {
            self.diagnostics.log_warning(
                &format!("Recorded active model {} is no longer available", id),
                SOURCE,
            );
        }

        tracing::debug!(
            target: "aider_session.catalog",
            configurations = configurations.len(),
            active = ?active.as_ref().map(|c| c.display_name()),
            "catalog initialized"
        );

        *self.configurations.write().await = configurations;
        *self.active.write().await = active;
        Ok(())
    }

    /// Catalog entries, optionally filtered by provider
    pub async fn available_models(&self, provider: Option<AiProvider>) -> Vec<ProviderConfiguration> {
        self.configurations
            .read()
            .await
            .iter()
            .filter(|c| provider.map_or(true, |p| c.provider == p))
            .cloned()
            .collect()
    }

    /// Known model names for a provider, for pickers
    pub fn available_models_for_provider(&self, provider: AiProvider) -> Vec<&'static str> {
        known_models::available_models_for_provider(provider)
    }

    /// Copy of the active configuration
    pub async fn active_model(&self) -> Option<ProviderConfiguration> {
        self.active.read().await.clone()
    }

    /// Activate the first enabled entry for `provider` (and `model_name`,
    /// compared case-insensitively, when given).
    ///
    /// Returns `Ok(false)` with nothing changed when no entry matches.
    pub async fn set_active_model(
        &self,
        provider: AiProvider,
        model_name: Option<&str>,
    ) -> Result<bool> {
        let _switch = self.switch_lock.lock().await;

        let wanted = model_name.map(str::trim).filter(|m| !m.is_empty());
        let candidate = self
            .configurations
            .read()
            .await
            .iter()
            .find(|c| {
                c.provider == provider
                    && c.is_enabled
                    && c.is_valid()
                    && wanted.map_or(true, |m| c.model().eq_ignore_ascii_case(m))
            })
            .cloned();

        let Some(candidate) = candidate else {
            self.diagnostics.log_warning(
                &format!(
                    "No enabled {} model matches {}",
                    provider,
                    wanted.unwrap_or("any model")
                ),
                SOURCE,
            );
            return Ok(false);
        };

        self.store.set_active_model_id(Some(candidate.id)).await?;
        let previous = self.replace_active(Some(candidate.clone())).await;

        self.diagnostics.log_info(
            &format!("Active model set to {}", candidate.display_name()),
            SOURCE,
        );
        self.active_model_changed.emit(&ActiveModelChanged {
            previous,
            current: Some(candidate),
        });
        Ok(true)
    }

    /// Validate, stamp and upsert a configuration.
    ///
    /// Saving the active model replaces the active snapshot; disabling it
    /// deactivates it.
    pub async fn save_configuration(&self, config: ProviderConfiguration) -> Result<()> {
        config.validate()?;
        let mut config = config;
        config.touch();

        let _switch = self.switch_lock.lock().await;
        self.store.save_model_configuration(&config).await?;

        {
            let mut configurations = self.configurations.write().await;
            match configurations.iter_mut().find(|c| c.id == config.id) {
                Some(existing) => *existing = config.clone(),
                None => configurations.push(config.clone()),
            }
        }

        let is_active = self
            .active
            .read()
            .await
            .as_ref()
            .is_some_and(|a| a.id == config.id);
        if is_active {
            let current = if config.is_enabled {
                Some(config)
            } else {
                self.store.set_active_model_id(None).await?;
                None
            };
            let previous = self.replace_active(current.clone()).await;
            self.active_model_changed
                .emit(&ActiveModelChanged { previous, current });
        }
        Ok(())
    }

    /// Remove a configuration. Removing the active model clears it.
    pub async fn remove_configuration(&self, id: Uuid) -> Result<bool> {
        let _switch = self.switch_lock.lock().await;

        let removed_from_store = self.store.remove_model_configuration(id).await?;
        let removed_from_memory = {
            let mut configurations = self.configurations.write().await;
            let before = configurations.len();
            configurations.retain(|c| c.id != id);
            configurations.len() < before
        };

        let was_active = self
            .active
            .read()
            .await
            .as_ref()
            .is_some_and(|a| a.id == id);
        if was_active {
            self.store.set_active_model_id(None).await?;
            let previous = self.replace_active(None).await;
            self.active_model_changed.emit(&ActiveModelChanged {
                previous,
                current: None,
            });
        }

        Ok(removed_from_store || removed_from_memory)
    }

    /// Probe a configuration. Invalid configurations fail without any
    /// network traffic.
    pub async fn test_connection(&self, config: &ProviderConfiguration) -> ConnectionTestResult {
        let started = Instant::now();

        let errors = config.validation_errors();
        if !errors.is_empty() {
            return ConnectionTestResult::failure(started.elapsed(), errors.join("; "));
        }

        let transport = match self.registry.transport_for(config) {
            Ok(transport) => transport,
            Err(e) => return ConnectionTestResult::failure(started.elapsed(), e.to_string()),
        };

        let outcome = tokio::time::timeout(config.timeout(), transport.probe()).await;
        let elapsed = started.elapsed();
        let result = match outcome {
            Ok(Ok(report)) => ConnectionTestResult::success(elapsed, report.model_version),
            Ok(Err(e)) => ConnectionTestResult::failure(elapsed, e.to_string()),
            Err(_) => ConnectionTestResult::failure(elapsed, ApiError::Timeout.to_string()),
        };

        match &result.error_message {
            None => self.diagnostics.log_info(
                &format!(
                    "Connection test for {} succeeded in {} ms",
                    config.display_name(),
                    elapsed.as_millis()
                ),
                SOURCE,
            ),
            Some(message) => self.diagnostics.log_warning(
                &format!(
                    "Connection test for {} failed: {}",
                    config.display_name(),
                    message
                ),
                SOURCE,
            ),
        }
        result
    }

    /// Probe every configuration concurrently
    pub async fn test_all_connections(&self) -> Vec<(ProviderConfiguration, ConnectionTestResult)> {
        let configurations = self.available_models(None).await;
        let results =
            futures::future::join_all(configurations.iter().map(|c| self.test_connection(c)))
                .await;
        configurations.into_iter().zip(results).collect()
    }

    /// Complete `request` against the active model.
    ///
    /// An empty `model` is filled from the active configuration. Each
    /// attempt is bounded by its timeout; transient failures are retried up
    /// to its `max_retries`.
    pub async fn get_completion(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let active = self.active_model().await.ok_or(AiderError::NoActiveModel)?;
        self.dispatch(&active, request).await
    }

    /// Send a conversation to the active model.
    ///
    /// Provider failures come back as an unsuccessful [`ChatResponse`].
    pub async fn send_chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        if messages.is_empty() {
            return Ok(ChatResponse::failure("No messages provided"));
        }

        let active = self.active_model().await.ok_or(AiderError::NoActiveModel)?;
        let request = CompletionRequest::from_history(model_for(&active), messages);

        match self.dispatch(&active, request).await {
            Ok(response) => Ok(ChatResponse::success(response.content, response.model)),
            Err(e) => {
                self.diagnostics.handle_error(&e, SOURCE);
                Ok(ChatResponse::failure(e.to_string()))
            }
        }
    }

    /// Send a single user message to the active model
    pub async fn send_chat_message(&self, text: &str) -> Result<ChatResponse> {
        if text.trim().is_empty() {
            return Ok(ChatResponse::failure("Message content is required"));
        }
        self.send_chat(&[ChatMessage::user(text)]).await
    }

    /// Subscription point for active-model switches
    pub fn on_active_model_changed(&self) -> &EventRegistry<ActiveModelChanged> {
        &self.active_model_changed
    }

    async fn replace_active(
        &self,
        current: Option<ProviderConfiguration>,
    ) -> Option<ProviderConfiguration> {
        std::mem::replace(&mut *self.active.write().await, current)
    }

    async fn dispatch(
        &self,
        active: &ProviderConfiguration,
        mut request: CompletionRequest,
    ) -> Result<CompletionResponse> {
        if request.model.trim().is_empty() {
            request.model = model_for(active);
        }

        let transport: Arc<dyn ProviderTransport> = self.registry.transport_for(active)?;
        let timeout = active.timeout();

        tracing::debug!(
            target: "aider_session.catalog",
            provider = %active.provider,
            model = %request.model,
            messages = request.messages.len(),
            "dispatching completion"
        );

        with_retry(
            || {
                let transport = transport.clone();
                let request = request.clone();
                async move {
                    match tokio::time::timeout(timeout, transport.complete(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(AiderError::Api(ApiError::Timeout)),
                    }
                }
            },
            active.max_retries,
            &self.backoff,
            "completion",
        )
        .await
    }
}

/// Model name to send for `config`
fn model_for(config: &ProviderConfiguration) -> String {
    match config.model().trim() {
        "" => known_models::default_model(config.provider).to_string(),
        model => model.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JsonConfigurationStore, SettingsDocument};
    use crate::llm::mock_provider::MockProvider;

    fn catalog_with(configs: Vec<ProviderConfiguration>, active: Option<Uuid>) -> ProviderCatalog {
        let document = SettingsDocument {
            model_configurations: configs,
            active_model_id: active,
            ..SettingsDocument::default()
        };
        let store = Arc::new(JsonConfigurationStore::in_memory(document));
        let registry = ProviderRegistry::with_transport(Arc::new(MockProvider::new(
            AiProvider::ChatGpt,
        )));
        ProviderCatalog::new(store, registry).with_backoff(Backoff::immediate())
    }

    #[test]
    fn test_model_for_falls_back_to_known_default() {
        let config = ProviderConfiguration::new(AiProvider::Ollama);
        assert_eq!(model_for(&config), "llama3.1");

        let config = config.with_model("  qwen2.5-coder ");
        assert_eq!(model_for(&config), "qwen2.5-coder");
    }

    #[tokio::test]
    async fn test_initialize_restores_valid_active() {
        let config = ProviderConfiguration::new(AiProvider::Claude).with_api_key("k");
        let catalog = catalog_with(vec![config.clone()], Some(config.id));
        catalog.initialize().await.unwrap();

        assert_eq!(catalog.active_model().await.map(|c| c.id), Some(config.id));
    }

    #[tokio::test]
    async fn test_initialize_ignores_stale_active_id() {
        let config = ProviderConfiguration::new(AiProvider::Claude).with_api_key("k");
        let catalog = catalog_with(vec![config], Some(Uuid::new_v4()));
        catalog.initialize().await.unwrap();

        assert!(catalog.active_model().await.is_none());
        assert_eq!(catalog.available_models(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_ignores_invalid_active() {
        // Missing API key
        let config = ProviderConfiguration::new(AiProvider::ChatGpt);
        let catalog = catalog_with(vec![config.clone()], Some(config.id));
        catalog.initialize().await.unwrap();

        assert!(catalog.active_model().await.is_none());
    }

    #[tokio::test]
    async fn test_available_models_filter() {
        let catalog = catalog_with(
            vec![
                ProviderConfiguration::new(AiProvider::Claude).with_api_key("k"),
                ProviderConfiguration::new(AiProvider::Ollama)
                    .with_endpoint("http://localhost:11434"),
            ],
            None,
        );
        catalog.initialize().await.unwrap();

        assert_eq!(catalog.available_models(None).await.len(), 2);
        assert_eq!(
            catalog.available_models(Some(AiProvider::Ollama)).await.len(),
            1
        );
        assert!(catalog
            .available_models(Some(AiProvider::ChatGpt))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_send_chat_empty_precedes_active_check() {
        let catalog = catalog_with(vec![], None);
        let response = catalog.send_chat(&[]).await.unwrap();
        assert!(!response.is_success);
        assert_eq!(response.error_message.as_deref(), Some("No messages provided"));
    }

    #[tokio::test]
    async fn test_get_completion_requires_active_model() {
        let catalog = catalog_with(vec![], None);
        let result = catalog
            .get_completion(CompletionRequest::new("", vec![]))
            .await;
        assert!(matches!(result, Err(AiderError::NoActiveModel)));
    }
}
