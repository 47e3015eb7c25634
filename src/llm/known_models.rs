// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Static model catalogue used to populate pickers

use crate::config::AiProvider;

const CHATGPT_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-4",
    "gpt-3.5-turbo",
];

const CLAUDE_MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-opus-4-20250514",
    "claude-3-5-sonnet-latest",
    "claude-3-5-haiku-latest",
    "claude-3-opus-latest",
];

const OLLAMA_MODELS: &[&str] = &[
    "llama3.1",
    "llama3.2",
    "codellama",
    "qwen2.5-coder",
    "deepseek-coder-v2",
    "mistral",
];

/// Known model names for `provider`
pub fn available_models_for_provider(provider: AiProvider) -> Vec<&'static str> {
    match provider {
        AiProvider::ChatGpt => CHATGPT_MODELS,
        AiProvider::Claude => CLAUDE_MODELS,
        AiProvider::Ollama => OLLAMA_MODELS,
    }
    .to_vec()
}

/// Same as [`available_models_for_provider`], keyed by a provider name.
/// Unknown names yield an empty list.
pub fn available_models_for_provider_name(name: &str) -> Vec<&'static str> {
    name.parse::<AiProvider>()
        .map(available_models_for_provider)
        .unwrap_or_default()
}

/// First entry of the catalogue, used when a configuration names no model
pub fn default_model(provider: AiProvider) -> &'static str {
    match provider {
        AiProvider::ChatGpt => CHATGPT_MODELS[0],
        AiProvider::Claude => CLAUDE_MODELS[0],
        AiProvider::Ollama => OLLAMA_MODELS[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_provider_has_models() {
        for provider in AiProvider::ALL {
            let models = available_models_for_provider(provider);
            assert!(!models.is_empty());
            assert_eq!(models[0], default_model(provider));
        }
    }

    #[test]
    fn test_by_name() {
        assert!(available_models_for_provider_name("claude").contains(&"claude-3-5-haiku-latest"));
        assert!(available_models_for_provider_name("OLLAMA").contains(&"llama3.1"));
        assert!(available_models_for_provider_name("gemini").is_empty());
    }
}
