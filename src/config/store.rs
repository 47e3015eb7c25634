// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration store abstraction and the JSON-file implementation

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::provider::ProviderConfiguration;
use super::settings::{SessionOptions, SettingsDocument};
use crate::error::{AiderError, Result};
use crate::events::{ConfigurationChanged, EventRegistry};

/// Key reported in [`ConfigurationChanged`] when the active id changes
pub const ACTIVE_MODEL_KEY: &str = "active_model_id";
/// Key reported in [`ConfigurationChanged`] when the catalog changes
pub const MODEL_CONFIGURATIONS_KEY: &str = "model_configurations";

/// Typed key/value configuration store
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// All stored model configurations
    async fn get_all_model_configurations(&self) -> Result<Vec<ProviderConfiguration>>;

    /// Insert or replace a configuration by id
    async fn save_model_configuration(&self, config: &ProviderConfiguration) -> Result<()>;

    /// Remove a configuration. Returns false if it did not exist.
    async fn remove_model_configuration(&self, id: Uuid) -> Result<bool>;

    /// Id of the active configuration, if recorded
    async fn get_active_model_id(&self) -> Result<Option<Uuid>>;

    /// Record (or clear) the active configuration id
    async fn set_active_model_id(&self, id: Option<Uuid>) -> Result<()>;

    /// Raw value lookup
    async fn get_raw_value(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Raw value write; fires [`ConfigurationChanged`]
    async fn set_raw_value(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Change notifications
    fn configuration_changed(&self) -> &EventRegistry<ConfigurationChanged>;
}

/// Typed accessors over any [`ConfigurationStore`]
#[async_trait]
pub trait ConfigurationStoreExt: ConfigurationStore {
    /// Read `key` as `T`, falling back to `default` when missing or mistyped
    async fn get_value<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        validate_key(key)?;
        Ok(match self.get_raw_value(key).await? {
            Some(value) => serde_json::from_value(value).unwrap_or(default),
            None => default,
        })
    }

    /// Write `value` under `key`
    async fn set_value<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        validate_key(key)?;
        let value = serde_json::to_value(value)?;
        self.set_raw_value(key, value).await
    }
}

impl<S: ConfigurationStore + ?Sized> ConfigurationStoreExt for S {}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(AiderError::InvalidInput(
            "Configuration key cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// [`ConfigurationStore`] backed by a [`SettingsDocument`] JSON file.
///
/// An in-memory store (no path) never touches disk.
pub struct JsonConfigurationStore {
    path: Option<PathBuf>,
    document: RwLock<SettingsDocument>,
    /// Held from mutation through the file write so saves land in order
    save_lock: Mutex<()>,
    changed: EventRegistry<ConfigurationChanged>,
}

impl JsonConfigurationStore {
    /// Open the store at the default settings path
    pub async fn open() -> Result<Self> {
        Self::open_at(SettingsDocument::default_path()).await
    }

    /// Open the store at `path`, loading defaults if the file is missing
    pub async fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = SettingsDocument::load_from(&path).await?;
        Ok(Self {
            path: Some(path),
            document: RwLock::new(document),
            save_lock: Mutex::new(()),
            changed: EventRegistry::new(),
        })
    }

    /// Store that lives only in memory
    pub fn in_memory(document: SettingsDocument) -> Self {
        Self {
            path: None,
            document: RwLock::new(document),
            save_lock: Mutex::new(()),
            changed: EventRegistry::new(),
        }
    }

    /// Session options recorded in the document
    pub async fn session_options(&self) -> SessionOptions {
        self.document.read().await.session.clone()
    }

    /// Snapshot of the whole document
    pub async fn snapshot(&self) -> SettingsDocument {
        self.document.read().await.clone()
    }

    /// Apply `mutate` and persist the result.
    ///
    /// Readers are not blocked by the file write. If the write fails the
    /// previous document is restored.
    async fn update<F, R>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut SettingsDocument) -> R + Send,
        R: Send,
    {
        let Some(path) = &self.path else {
            return Ok(mutate(&mut *self.document.write().await));
        };

        let _save = self.save_lock.lock().await;
        let (result, previous, snapshot) = {
            let mut document = self.document.write().await;
            let previous = document.clone();
            let result = mutate(&mut document);
            (result, previous, document.clone())
        };

        if let Err(error) = snapshot.save_to(path).await {
            tracing::warn!(
                target: "aider_session.config",
                path = %path.display(),
                %error,
                "failed to save settings, reverting"
            );
            *self.document.write().await = previous;
            return Err(error);
        }
        Ok(result)
    }

    fn notify(&self, key: &str, new_value: serde_json::Value) {
        self.changed.emit(&ConfigurationChanged {
            key: key.to_string(),
            new_value,
        });
    }
}

#[async_trait]
impl ConfigurationStore for JsonConfigurationStore {
    async fn get_all_model_configurations(&self) -> Result<Vec<ProviderConfiguration>> {
        Ok(self.document.read().await.model_configurations.clone())
    }

    async fn save_model_configuration(&self, config: &ProviderConfiguration) -> Result<()> {
        let config = config.clone();
        let id = config.id;
        self.update(move |doc| {
            match doc.model_configurations.iter_mut().find(|c| c.id == config.id) {
                Some(existing) => *existing = config,
                None => doc.model_configurations.push(config),
            }
        })
        .await?;
        self.notify(MODEL_CONFIGURATIONS_KEY, serde_json::json!(id));
        Ok(())
    }

    async fn remove_model_configuration(&self, id: Uuid) -> Result<bool> {
        let removed = self
            .update(move |doc| {
                let before = doc.model_configurations.len();
                doc.model_configurations.retain(|c| c.id != id);
                doc.model_configurations.len() < before
            })
            .await?;
        if removed {
            self.notify(MODEL_CONFIGURATIONS_KEY, serde_json::json!(id));
        }
        Ok(removed)
    }

    async fn get_active_model_id(&self) -> Result<Option<Uuid>> {
        Ok(self.document.read().await.active_model_id)
    }

    async fn set_active_model_id(&self, id: Option<Uuid>) -> Result<()> {
        self.update(move |doc| doc.active_model_id = id).await?;
        self.notify(ACTIVE_MODEL_KEY, serde_json::json!(id));
        Ok(())
    }

    async fn get_raw_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.document.read().await.values.get(key).cloned())
    }

    async fn set_raw_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let owned_key = key.to_string();
        let stored = value.clone();
        self.update(move |doc| {
            doc.values.insert(owned_key, stored);
        })
        .await?;
        self.notify(key, value);
        Ok(())
    }

    fn configuration_changed(&self) -> &EventRegistry<ConfigurationChanged> {
        &self.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiProvider;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_value_default_when_missing() {
        let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
        let value: u32 = store.get_value("font_size", 12).await.unwrap();
        assert_eq!(value, 12);
    }

    #[tokio::test]
    async fn test_set_and_get_value() {
        let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
        store.set_value("auto_save", &true).await.unwrap();
        let value: bool = store.get_value("auto_save", false).await.unwrap();
        assert!(value);
    }

    #[tokio::test]
    async fn test_get_value_type_mismatch_uses_default() {
        let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
        store.set_value("name", "text").await.unwrap();
        let value: u32 = store.get_value("name", 7).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
        assert!(matches!(
            store.set_value(" ", &1).await,
            Err(AiderError::InvalidInput(_))
        ));
        let blank: Result<u32> = store.get_value("", 0).await;
        assert!(blank.is_err());
    }

    #[tokio::test]
    async fn test_set_value_fires_change() {
        let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.configuration_changed().subscribe(move |event| {
            sink.lock()
                .unwrap()
                .push((event.key.clone(), event.new_value.clone()));
        });

        store.set_value("theme", "dark").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "theme");
        assert_eq!(seen[0].1, serde_json::json!("dark"));
    }

    #[tokio::test]
    async fn test_save_model_configuration_upserts() {
        let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
        let mut config = ProviderConfiguration::new(AiProvider::ChatGpt).with_api_key("a");
        store.save_model_configuration(&config).await.unwrap();

        config.set_api_key(Some("b".to_string()));
        store.save_model_configuration(&config).await.unwrap();

        let all = store.get_all_model_configurations().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].api_key.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_remove_model_configuration() {
        let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
        let config = ProviderConfiguration::new(AiProvider::Claude).with_api_key("a");
        store.save_model_configuration(&config).await.unwrap();

        assert!(store.remove_model_configuration(config.id).await.unwrap());
        assert!(!store.remove_model_configuration(config.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_persists_active_id() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let config = ProviderConfiguration::new(AiProvider::Ollama)
            .with_endpoint("http://localhost:11434");

        {
            let store = JsonConfigurationStore::open_at(&path).await.unwrap();
            store.save_model_configuration(&config).await.unwrap();
            store.set_active_model_id(Some(config.id)).await.unwrap();
        }

        let reopened = JsonConfigurationStore::open_at(&path).await.unwrap();
        assert_eq!(
            reopened.get_active_model_id().await.unwrap(),
            Some(config.id)
        );
        assert_eq!(
            reopened.get_all_model_configurations().await.unwrap().len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_updates_all_reach_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let store = Arc::new(JsonConfigurationStore::open_at(&path).await.unwrap());
        let config = ProviderConfiguration::new(AiProvider::Ollama)
            .with_endpoint("http://localhost:11434");

        let (a, b, c) = tokio::join!(
            store.set_value("theme", "dark"),
            store.set_value("font_size", &14),
            store.set_active_model_id(Some(config.id)),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let reopened = JsonConfigurationStore::open_at(&path).await.unwrap();
        assert_eq!(
            reopened.get_value("theme", String::new()).await.unwrap(),
            "dark"
        );
        assert_eq!(reopened.get_value("font_size", 0u32).await.unwrap(), 14);
        assert_eq!(
            reopened.get_active_model_id().await.unwrap(),
            Some(config.id)
        );
    }

    #[tokio::test]
    async fn test_failed_write_reverts_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let store = JsonConfigurationStore::open_at(&path).await.unwrap();
        // A directory where the file should be makes every write fail
        std::fs::create_dir(&path).unwrap();

        assert!(store.set_active_model_id(Some(Uuid::new_v4())).await.is_err());
        assert_eq!(store.get_active_model_id().await.unwrap(), None);
        assert!(store.set_value("theme", "dark").await.is_err());
        assert!(store.snapshot().await.values.get("theme").is_none());
    }
}
