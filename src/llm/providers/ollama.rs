// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Ollama local model provider implementation
//!
//! Non-streaming chat via `/api/chat`; the probe reads `/api/version`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::common::{
    build_client, check_status, error_message, join_url, parse_retry_after_seconds, role_name,
    status_error,
};
use crate::config::{AiProvider, ProviderConfiguration};
use crate::error::{AiderError, ApiError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ProbeReport, ProviderTransport, Usage,
};

/// Endpoint used when the configuration names none
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const NOT_RUNNING: &str = "Ollama is not running. Start the Ollama app or run 'ollama serve'";

/// Ollama local model provider
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Build from a configuration
    pub fn from_config(config: &ProviderConfiguration) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            base_url: config
                .endpoint_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        })
    }

    fn build_request(&self, request: &CompletionRequest) -> OllamaRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OllamaMessage {
            role: role_name(m.role).to_string(),
            content: m.content.clone(),
        }));

        OllamaRequest {
            model: request.model.clone(),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: Some(request.temperature),
                num_predict: Some(i64::from(request.max_tokens)),
            },
        }
    }

    /// Parse an error response
    fn parse_error(status: u16, body: &str, retry_after: Option<u64>, model: &str) -> AiderError {
        let message = error_message(body);
        if message.contains("model") && message.contains("not found") {
            AiderError::Api(ApiError::ModelNotFound(model.to_string()))
        } else {
            status_error(status, body, retry_after, model)
        }
    }

    fn map_send_error(error: reqwest::Error) -> AiderError {
        if error.is_timeout() {
            AiderError::Api(ApiError::Timeout)
        } else if error.is_connect() {
            AiderError::Api(ApiError::Network(NOT_RUNNING.to_string()))
        } else {
            AiderError::Http(error)
        }
    }
}

#[async_trait]
impl ProviderTransport for OllamaProvider {
    fn provider(&self) -> AiProvider {
        AiProvider::Ollama
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request);

        let response = self
            .client
            .post(join_url(&self.base_url, "api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after_seconds(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &text, retry_after, &request.model));
        }

        let api_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AiderError::Api(ApiError::InvalidResponse(e.to_string())))?;

        Ok(CompletionResponse {
            content: api_response.message.content,
            model: api_response.model.unwrap_or(request.model),
            usage: Usage {
                input_tokens: api_response.prompt_eval_count.unwrap_or(0),
                output_tokens: api_response.eval_count.unwrap_or(0),
            },
        })
    }

    async fn probe(&self) -> Result<ProbeReport> {
        let response = self
            .client
            .get(join_url(&self.base_url, "api/version"))
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let response = check_status(response, "").await?;

        let version: OllamaVersion = response
            .json()
            .await
            .map_err(|e| AiderError::Api(ApiError::InvalidResponse(e.to_string())))?;

        Ok(ProbeReport {
            model_version: version.version,
        })
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaVersion {
    #[serde(default)]
    version: Option<String>,
}
