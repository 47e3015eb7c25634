// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::Arc;

use aider_session::config::provider::{MAX_RETRIES_LIMIT, MAX_TIMEOUT_SECONDS};
use aider_session::config::{
    AiProvider, ConfigurationStore, ConfigurationStoreExt, JsonConfigurationStore,
    ProviderConfiguration, SettingsDocument,
};
use aider_session::llm::{MockProvider, ProviderCatalog, ProviderRegistry};
use aider_session::AiderError;
use proptest::prelude::*;
use tempfile::TempDir;

#[test]
fn test_chatgpt_with_every_field_wrong() {
    let config = ProviderConfiguration::new(AiProvider::ChatGpt)
        .with_api_key("   ")
        .with_timeout_seconds(301)
        .with_max_retries(11);

    assert_eq!(
        config.validation_errors(),
        vec![
            "API key is required for ChatGPT".to_string(),
            "Timeout must be between 1 and 300 seconds".to_string(),
            "Max retries must be between 0 and 10".to_string(),
        ]
    );
}

#[test]
fn test_validate_reports_every_message() {
    let config = ProviderConfiguration::new(AiProvider::Ollama).with_timeout_seconds(0);

    match config.validate() {
        Err(AiderError::InvalidConfiguration(errors)) => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0], "Endpoint URL is required for Ollama");
        }
        other => panic!("expected invalid configuration, got {:?}", other),
    }
}

#[test]
fn test_https_ollama_endpoint_is_valid() {
    let config = ProviderConfiguration::new(AiProvider::Ollama)
        .with_endpoint("https://ollama.internal:11434");
    assert!(config.is_valid());
}

#[test]
fn test_configuration_json_round_trip_keeps_settings() {
    let config = ProviderConfiguration::new(AiProvider::Claude)
        .with_api_key("sk-ant")
        .with_model("claude-3-5-haiku-latest")
        .with_setting("temperature", serde_json::json!(0.2));

    let json = serde_json::to_string(&config).unwrap();
    let parsed: ProviderConfiguration = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed, config);
    assert_eq!(
        parsed.additional_settings.get("temperature"),
        Some(&serde_json::json!(0.2))
    );
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    let config = ProviderConfiguration::new(AiProvider::Ollama)
        .with_endpoint("http://localhost:11434")
        .with_model("llama3.1");

    {
        let store = JsonConfigurationStore::open_at(&path).await.unwrap();
        store.save_model_configuration(&config).await.unwrap();
        store.set_active_model_id(Some(config.id)).await.unwrap();
        store.set_value("theme", &"dark").await.unwrap();
    }

    let store = JsonConfigurationStore::open_at(&path).await.unwrap();
    assert_eq!(store.get_all_model_configurations().await.unwrap(), vec![config.clone()]);
    assert_eq!(store.get_active_model_id().await.unwrap(), Some(config.id));
    assert_eq!(
        store.get_value("theme", String::new()).await.unwrap(),
        "dark"
    );
}

#[tokio::test]
async fn test_catalog_restores_active_model_after_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    let config = ProviderConfiguration::new(AiProvider::Claude)
        .with_api_key("sk-ant")
        .with_model("claude-sonnet-4-20250514");

    let registry =
        || ProviderRegistry::with_transport(Arc::new(MockProvider::new(AiProvider::Claude)));

    {
        let store = Arc::new(JsonConfigurationStore::open_at(&path).await.unwrap());
        let catalog = ProviderCatalog::new(store, registry());
        catalog.initialize().await.unwrap();
        catalog.save_configuration(config.clone()).await.unwrap();
        assert!(catalog
            .set_active_model(AiProvider::Claude, Some("claude-sonnet-4-20250514"))
            .await
            .unwrap());
    }

    let store = Arc::new(JsonConfigurationStore::open_at(&path).await.unwrap());
    let catalog = ProviderCatalog::new(store, registry());
    catalog.initialize().await.unwrap();

    let active = catalog.active_model().await.unwrap();
    assert_eq!(active.id, config.id);
    assert_eq!(active.model(), "claude-sonnet-4-20250514");
}

#[tokio::test]
async fn test_in_memory_store_keeps_values() {
    let store = JsonConfigurationStore::in_memory(SettingsDocument::default());
    store.set_value("theme", &"light").await.unwrap();

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.values.get("theme"), Some(&serde_json::json!("light")));
}

fn any_provider() -> impl Strategy<Value = AiProvider> {
    prop_oneof![
        Just(AiProvider::ChatGpt),
        Just(AiProvider::Claude),
        Just(AiProvider::Ollama),
    ]
}

proptest! {
    #[test]
    fn prop_timeout_bounds(timeout in 0u32..1000) {
        let config = ProviderConfiguration::new(AiProvider::Claude)
            .with_api_key("k")
            .with_timeout_seconds(timeout);
        prop_assert_eq!(
            config.is_valid(),
            (1..=MAX_TIMEOUT_SECONDS).contains(&timeout)
        );
    }

    #[test]
    fn prop_retry_bounds(retries in 0u32..100) {
        let config = ProviderConfiguration::new(AiProvider::Ollama)
            .with_endpoint("http://localhost:11434")
            .with_max_retries(retries);
        prop_assert_eq!(config.is_valid(), retries <= MAX_RETRIES_LIMIT);
    }

    #[test]
    fn prop_api_key_ignored_for_ollama(key in ".{0,40}") {
        let config = ProviderConfiguration::new(AiProvider::Ollama)
            .with_endpoint("http://localhost:11434")
            .with_api_key(key);
        prop_assert!(config.is_valid());
    }

    #[test]
    fn prop_validation_is_deterministic(
        provider in any_provider(),
        key in proptest::option::of("[ a-z0-9-]{0,12}"),
        endpoint in proptest::option::of("(http|https|ftp)://[a-z]{1,8}(:[0-9]{2,5})?"),
        timeout in 0u32..400,
        retries in 0u32..20,
    ) {
        let mut config = ProviderConfiguration::new(provider)
            .with_timeout_seconds(timeout)
            .with_max_retries(retries);
        config.set_api_key(key);
        config.set_endpoint_url(endpoint);

        let errors = config.validation_errors();
        prop_assert_eq!(&errors, &config.clone().validation_errors());
        prop_assert_eq!(errors.is_empty(), config.is_valid());
        prop_assert!(errors.len() <= 3);
    }

    #[test]
    fn prop_display_name_mentions_provider(provider in any_provider(), model in "[a-z0-9.-]{0,16}") {
        let config = ProviderConfiguration::new(provider).with_model(model.clone());
        let display = config.display_name();
        prop_assert!(display.starts_with(provider.name()));
        if !model.is_empty() {
            prop_assert!(display.contains(&model));
        }
    }
}
