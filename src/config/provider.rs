// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider configuration model and validation

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AiderError, Result};

/// Smallest accepted request timeout
pub const MIN_TIMEOUT_SECONDS: u32 = 1;
/// Largest accepted request timeout
pub const MAX_TIMEOUT_SECONDS: u32 = 300;
/// Largest accepted retry count
pub const MAX_RETRIES_LIMIT: u32 = 10;

const DEFAULT_TIMEOUT_SECONDS: u32 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Supported AI backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// OpenAI chat models
    #[serde(alias = "openai")]
    ChatGpt,
    /// Anthropic Claude models
    #[serde(alias = "anthropic")]
    Claude,
    /// Self-hosted Ollama server
    Ollama,
}

impl AiProvider {
    /// Every provider, in display order
    pub const ALL: [AiProvider; 3] = [AiProvider::ChatGpt, AiProvider::Claude, AiProvider::Ollama];

    /// Human-readable provider name
    pub fn name(&self) -> &'static str {
        match self {
            AiProvider::ChatGpt => "ChatGPT",
            AiProvider::Claude => "Claude",
            AiProvider::Ollama => "Ollama",
        }
    }

    /// Hosted providers authenticate with an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, AiProvider::ChatGpt | AiProvider::Claude)
    }

    /// Self-hosted providers are reached through a user-supplied endpoint
    pub fn supports_custom_endpoint(&self) -> bool {
        matches!(self, AiProvider::Ollama)
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AiProvider {
    type Err = AiderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatgpt" | "openai" => Ok(AiProvider::ChatGpt),
            "claude" | "anthropic" => Ok(AiProvider::Claude),
            "ollama" => Ok(AiProvider::Ollama),
            other => Err(AiderError::InvalidInput(format!(
                "Unknown provider: {}",
                other
            ))),
        }
    }
}

/// One AI model endpoint the catalog can dispatch to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    /// Stable identifier, generated once
    pub id: Uuid,

    /// Backend kind
    pub provider: AiProvider,

    /// Model identifier (e.g. "gpt-4o", "llama3")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// API key for hosted providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Endpoint URL. Required for Ollama; overrides the default base URL
    /// for hosted providers when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,

    /// Bumped on every mutation
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,

    /// Opaque extension values (temperature, etc.)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_settings: HashMap<String, serde_json::Value>,
}

fn default_timeout_seconds() -> u32 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfiguration {
    /// Create an enabled configuration with default timeout and retries
    pub fn new(provider: AiProvider) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            model_name: None,
            api_key: None,
            endpoint_url: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            is_enabled: true,
            last_modified: Utc::now(),
            additional_settings: HashMap::new(),
        }
    }

    /// Set the model name
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.set_model_name(Some(model_name.into()));
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.set_api_key(Some(api_key.into()));
        self
    }

    /// Set the endpoint URL
    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.set_endpoint_url(Some(endpoint_url.into()));
        self
    }

    /// Set the timeout in seconds
    pub fn with_timeout_seconds(mut self, timeout_seconds: u32) -> Self {
        self.set_timeout_seconds(timeout_seconds);
        self
    }

    /// Set the retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.set_max_retries(max_retries);
        self
    }

    /// Enable or disable
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.set_enabled(enabled);
        self
    }

    /// Add an opaque setting
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.set_setting(key, value);
        self
    }

    pub fn set_model_name(&mut self, model_name: Option<String>) {
        self.model_name = model_name;
        self.touch();
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key;
        self.touch();
    }

    pub fn set_endpoint_url(&mut self, endpoint_url: Option<String>) {
        self.endpoint_url = endpoint_url;
        self.touch();
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u32) {
        self.timeout_seconds = timeout_seconds;
        self.touch();
    }

    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries;
        self.touch();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
        self.touch();
    }

    pub fn set_setting(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.additional_settings.insert(key.into(), value);
        self.touch();
    }

    /// Update the last-modified timestamp
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    /// True for providers that authenticate with an API key
    pub fn requires_api_key(&self) -> bool {
        self.provider.requires_api_key()
    }

    /// True for providers reached through a custom endpoint
    pub fn supports_custom_endpoint(&self) -> bool {
        self.provider.supports_custom_endpoint()
    }

    /// Provider name, plus " (model)" when a model is set
    pub fn display_name(&self) -> String {
        match self.model_name.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => format!("{} ({})", self.provider.name(), model),
            _ => self.provider.name().to_string(),
        }
    }

    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    /// Model name, or an empty string when unset
    pub fn model(&self) -> &str {
        self.model_name.as_deref().unwrap_or_default()
    }

    /// Validation messages, one per violated rule, in a fixed order
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.provider.requires_api_key() {
            if is_blank(self.api_key.as_deref()) {
                errors.push(format!("API key is required for {}", self.provider.name()));
            }
        } else if self.provider.supports_custom_endpoint() {
            if let Some(error) = endpoint_error(self.endpoint_url.as_deref()) {
                errors.push(error.to_string());
            }
        }

        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&self.timeout_seconds) {
            errors.push(format!(
                "Timeout must be between {} and {} seconds",
                MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            errors.push(format!(
                "Max retries must be between 0 and {}",
                MAX_RETRIES_LIMIT
            ));
        }

        errors
    }

    /// Whether the configuration may become active or be dispatched to
    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }

    /// Fail with the full validation list if invalid
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AiderError::InvalidConfiguration(errors))
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn endpoint_error(endpoint: Option<&str>) -> Option<&'static str> {
    let endpoint = match endpoint.map(str::trim) {
        Some(e) if !e.is_empty() => e,
        _ => return Some("Endpoint URL is required for Ollama"),
    };

    match Url::parse(endpoint) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => None,
        Ok(_) => Some("Endpoint URL must use HTTP or HTTPS protocol"),
        Err(_) => Some("Endpoint URL must be a valid absolute URL"),
    }
}
