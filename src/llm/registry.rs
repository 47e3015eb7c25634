// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider dispatch table
//!
//! Maps each [`AiProvider`] tag to a factory that builds its transport from
//! a configuration. Adding a provider means one enum variant plus one entry
//! in [`ProviderRegistry::with_defaults`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AiProvider, ProviderConfiguration};
use crate::error::{AiderError, Result};
use crate::llm::provider::ProviderTransport;
use crate::llm::providers::{AnthropicProvider, OllamaProvider, OpenAiProvider};

/// Builds a transport for one configuration
pub type TransportFactory =
    Arc<dyn Fn(&ProviderConfiguration) -> Result<Arc<dyn ProviderTransport>> + Send + Sync>;

/// Dispatch table keyed by provider tag
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<AiProvider, TransportFactory>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the HTTP transports for every provider
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for provider in AiProvider::ALL {
            // Exhaustive so a new variant cannot be forgotten here
            let factory: TransportFactory = match provider {
                AiProvider::ChatGpt => Arc::new(openai_transport),
                AiProvider::Claude => Arc::new(anthropic_transport),
                AiProvider::Ollama => Arc::new(ollama_transport),
            };
            registry.factories.insert(provider, factory);
        }
        registry
    }

    /// Install (or replace) the factory for `provider`
    pub fn register<F>(&mut self, provider: AiProvider, factory: F)
    where
        F: Fn(&ProviderConfiguration) -> Result<Arc<dyn ProviderTransport>> + Send + Sync + 'static,
    {
        self.factories.insert(provider, Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_factory<F>(mut self, provider: AiProvider, factory: F) -> Self
    where
        F: Fn(&ProviderConfiguration) -> Result<Arc<dyn ProviderTransport>> + Send + Sync + 'static,
    {
        self.register(provider, factory);
        self
    }

    /// Route every provider to the same transport. Used by tests.
    pub fn with_transport(transport: Arc<dyn ProviderTransport>) -> Self {
        let mut registry = Self::new();
        for provider in AiProvider::ALL {
            let transport = transport.clone();
            registry.register(provider, move |_| Ok(transport.clone()));
        }
        registry
    }

    /// Whether a factory is registered for `provider`
    pub fn supports(&self, provider: AiProvider) -> bool {
        self.factories.contains_key(&provider)
    }

    /// Build the transport for `config`
    pub fn transport_for(&self, config: &ProviderConfiguration) -> Result<Arc<dyn ProviderTransport>> {
        let factory = self.factories.get(&config.provider).ok_or_else(|| {
            AiderError::Config(format!(
                "No transport registered for provider {}",
                config.provider
            ))
        })?;
        factory(config)
    }
}

fn openai_transport(config: &ProviderConfiguration) -> Result<Arc<dyn ProviderTransport>> {
    Ok(Arc::new(OpenAiProvider::from_config(config)?))
}

fn anthropic_transport(config: &ProviderConfiguration) -> Result<Arc<dyn ProviderTransport>> {
    Ok(Arc::new(AnthropicProvider::from_config(config)?))
}

fn ollama_transport(config: &ProviderConfiguration) -> Result<Arc<dyn ProviderTransport>> {
    Ok(Arc::new(OllamaProvider::from_config(config)?))
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&AiProvider> = self.factories.keys().collect();
        providers.sort_by_key(|p| p.name());
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .finish()
    }
}
