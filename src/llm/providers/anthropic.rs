// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Anthropic Claude API provider implementation
//!
//! Implements [`ProviderTransport`] over the Messages API. Anthropic has no
//! cheap health endpoint, so the probe is a one-token completion.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::common::{
    build_client, join_url, map_send_error, parse_retry_after_seconds, role_name, status_error,
};
use crate::config::{AiProvider, ProviderConfiguration};
use crate::error::{AiderError, ApiError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ProbeReport, PromptMessage, ProviderTransport, Usage,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model used for probes when the configuration names none
pub const DEFAULT_PROBE_MODEL: &str = "claude-3-5-haiku-latest";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    probe_model: String,
}

impl AnthropicProvider {
    /// Build from a configuration; `endpoint_url` overrides the public API.
    pub fn from_config(config: &ProviderConfiguration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AiderError::InvalidConfiguration(vec![format!(
                    "API key is required for {}",
                    AiProvider::Claude.name()
                )])
            })?;

        let probe_model = match config.model().trim() {
            "" => DEFAULT_PROBE_MODEL.to_string(),
            model => model.to_string(),
        };

        Ok(Self {
            client: build_client(config.timeout())?,
            api_key,
            base_url: config
                .endpoint_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string()),
            probe_model,
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: role_name(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            system: request.system.clone(),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
        }
    }

    /// Parse an error response
    ///
    /// # Arguments
    /// * `status` - HTTP status code
    /// * `body` - Response body
    /// * `retry_after` - Optional Retry-After header value in seconds
    /// * `model` - Model the request named
    fn parse_error(status: u16, body: &str, retry_after: Option<u64>, model: &str) -> AiderError {
        if let Ok(error_response) = serde_json::from_str::<AnthropicError>(body) {
            match error_response.error.error_type.as_str() {
                "authentication_error" | "permission_error" => {
                    return AiderError::Api(ApiError::AuthenticationFailed)
                }
                "not_found_error" => {
                    return AiderError::Api(ApiError::ModelNotFound(model.to_string()))
                }
                "invalid_request_error" => {
                    return AiderError::Api(ApiError::InvalidResponse(
                        error_response.error.message,
                    ))
                }
                _ => {}
            }
        }
        status_error(status, body, retry_after, model)
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<AnthropicResponse> {
        let response = self
            .client
            .post(join_url(&self.base_url, "v1/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, "Anthropic"))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            // Extract Retry-After header before consuming response body
            let retry_after = parse_retry_after_seconds(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &text, retry_after, &body.model));
        }

        response
            .json()
            .await
            .map_err(|e| AiderError::Api(ApiError::InvalidResponse(e.to_string())))
    }
}

#[async_trait]
impl ProviderTransport for AnthropicProvider {
    fn provider(&self) -> AiProvider {
        AiProvider::Claude
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request);
        let api_response = self.send(&body).await?;

        let content = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            model: api_response.model,
            usage: Usage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        })
    }

    async fn probe(&self) -> Result<ProbeReport> {
        let request = CompletionRequest::new(&self.probe_model, vec![PromptMessage::user("ping")])
            .with_max_tokens(1);
        let response = self.send(&self.build_request(&request)).await?;
        Ok(ProbeReport {
            model_version: Some(response.model),
        })
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfiguration {
        ProviderConfiguration::new(AiProvider::Claude).with_api_key("sk-ant-test")
    }

    #[test]
    fn test_probe_model_defaults() {
        let provider = AnthropicProvider::from_config(&config()).unwrap();
        assert_eq!(provider.probe_model, DEFAULT_PROBE_MODEL);

        let provider =
            AnthropicProvider::from_config(&config().with_model("claude-sonnet-4-20250514"))
                .unwrap();
        assert_eq!(provider.probe_model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_system_stays_out_of_messages() {
        let provider = AnthropicProvider::from_config(&config()).unwrap();
        let request = CompletionRequest::new("claude", vec![PromptMessage::user("hi")])
            .with_system("You are helpful");

        let body = provider.build_request(&request);
        assert_eq!(body.system.as_deref(), Some("You are helpful"));
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
    }

    #[test]
    fn test_parse_error_authentication() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert!(matches!(
            AnthropicProvider::parse_error(401, body, None, "m"),
            AiderError::Api(ApiError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_parse_error_rate_limit_uses_retry_after() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        assert!(matches!(
            AnthropicProvider::parse_error(429, body, Some(30), "m"),
            AiderError::Api(ApiError::RateLimited(30))
        ));
        assert!(matches!(
            AnthropicProvider::parse_error(429, body, None, "m"),
            AiderError::Api(ApiError::RateLimited(10))
        ));
    }

    #[test]
    fn test_parse_error_overloaded_is_server_error() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match AnthropicProvider::parse_error(529, body, None, "m") {
            AiderError::Api(ApiError::ServerError { status, message }) => {
                assert_eq!(status, 529);
                assert_eq!(message, "Overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_response_skips_non_text_blocks() {
        let json = r#"{
            "id": "msg_1",
            "model": "claude-3-5-haiku-20241022",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 2}
        }"#;
        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.content.len(), 2);
        assert!(matches!(response.content[1], AnthropicContentBlock::Other));
    }
}
