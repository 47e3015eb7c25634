// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Persisted settings document
//!
//! Handles loading and saving settings from ~/.aider-session/settings.json

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use super::provider::ProviderConfiguration;
use crate::error::Result;
use crate::llm::retry::Backoff;

/// Environment variable overriding the settings home directory
pub const HOME_ENV_VAR: &str = "AIDER_SESSION_HOME";

/// Root settings structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsDocument {
    /// Known model configurations
    #[serde(default)]
    pub model_configurations: Vec<ProviderConfiguration>,

    /// Id of the active configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_model_id: Option<Uuid>,

    /// Session delivery tuning
    #[serde(default)]
    pub session: SessionOptions,

    /// Free-form values written through `set_value`
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

/// Delivery tuning for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Base backoff between delivery attempts
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Backoff cap
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Jitter percentage (0.0 to 1.0)
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// Extra caller-side wait beyond the worst-case delivery time
    #[serde(default = "default_response_grace_secs")]
    pub response_grace_secs: u64,

    /// Per-attempt timeout when no model is active
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u32,

    /// Retries when no model is active
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Key of the live conversation slot in the conversation store
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8000
}

fn default_backoff_jitter() -> f64 {
    0.1
}

fn default_response_grace_secs() -> u64 {
    5
}

fn default_timeout_seconds() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_session_key() -> String {
    "current".to_string()
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            response_grace_secs: default_response_grace_secs(),
            default_timeout_seconds: default_timeout_seconds(),
            default_max_retries: default_max_retries(),
            session_key: default_session_key(),
        }
    }
}

impl SessionOptions {
    /// Backoff policy described by these options
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base_delay_ms: self.backoff_base_ms,
            max_delay_ms: self.backoff_max_ms,
            jitter: self.backoff_jitter,
        }
    }

    /// Grace period added to the caller-side wait
    pub fn response_grace(&self) -> Duration {
        Duration::from_secs(self.response_grace_secs)
    }
}

impl SettingsDocument {
    /// Get the settings home directory (~/.aider-session or $AIDER_SESSION_HOME).
    pub fn home() -> PathBuf {
        if let Ok(home) = std::env::var(HOME_ENV_VAR) {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aider-session")
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::home().join("settings.json")
    }

    /// Get the default conversation storage directory.
    pub fn conversations_dir() -> PathBuf {
        Self::home().join("conversations")
    }

    /// Load settings from a specific path. A missing file yields defaults.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let settings: SettingsDocument = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a specific path, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
