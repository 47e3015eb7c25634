// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI (ChatGPT) provider implementation
//!
//! Talks to the chat completions API. The probe lists models.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::common::{build_client, check_status, join_url, map_send_error, role_name};
use crate::config::{AiProvider, ProviderConfiguration};
use crate::error::{AiderError, ApiError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ProbeReport, ProviderTransport, Usage,
};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// ChatGPT provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Build from a configuration; `endpoint_url` overrides the public API.
    pub fn from_config(config: &ProviderConfiguration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AiderError::InvalidConfiguration(vec![format!(
                    "API key is required for {}",
                    AiProvider::ChatGpt.name()
                )])
            })?;

        Ok(Self {
            client: build_client(config.timeout())?,
            api_key,
            base_url: config
                .endpoint_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OpenAiMessage {
            role: role_name(m.role).to_string(),
            content: m.content.clone(),
        }));

        OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl ProviderTransport for OpenAiProvider {
    fn provider(&self) -> AiProvider {
        AiProvider::ChatGpt
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request);

        let response = self
            .client
            .post(join_url(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, "OpenAI"))?;
        let response = check_status(response, &request.model).await?;

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| AiderError::Api(ApiError::InvalidResponse(e.to_string())))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AiderError::Api(ApiError::InvalidResponse(
                    "Response contained no choices".to_string(),
                ))
            })?;

        let usage = api_response.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            model: api_response.model.unwrap_or(request.model),
            usage: Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }

    async fn probe(&self) -> Result<ProbeReport> {
        let response = self
            .client
            .get(join_url(&self.base_url, "models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_send_error(e, "OpenAI"))?;
        let response = check_status(response, "").await?;

        let models: OpenAiModelList = response
            .json()
            .await
            .map_err(|e| AiderError::Api(ApiError::InvalidResponse(e.to_string())))?;

        Ok(ProbeReport {
            model_version: models.data.into_iter().next().map(|m| m.id),
        })
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::PromptMessage;

    fn provider() -> OpenAiProvider {
        let config = ProviderConfiguration::new(AiProvider::ChatGpt).with_api_key("sk-test");
        OpenAiProvider::from_config(&config).unwrap()
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ProviderConfiguration::new(AiProvider::ChatGpt);
        assert!(matches!(
            OpenAiProvider::from_config(&config),
            Err(AiderError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(provider().base_url, OPENAI_API_URL);
    }

    #[test]
    fn test_endpoint_overrides_base_url() {
        let config = ProviderConfiguration::new(AiProvider::ChatGpt)
            .with_api_key("sk-test")
            .with_endpoint("http://localhost:8080/v1");
        let provider = OpenAiProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_build_request_puts_system_first() {
        let request = CompletionRequest::new(
            "gpt-4o",
            vec![
                PromptMessage::user("hi"),
                PromptMessage::assistant("hello"),
            ],
        )
        .with_system("be terse");

        let body = provider().build_request(&request);
        let roles: Vec<&str> = body.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(body.messages[0].content, "be terse");
        assert_eq!(body.model, "gpt-4o");
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        }"#;
        let response: OpenAiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hi"));
        assert_eq!(response.usage.unwrap().prompt_tokens, 5);
    }
}
