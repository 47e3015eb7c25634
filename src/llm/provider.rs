// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider transport trait and related types
//!
//! Defines the abstraction layer for the different AI backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AiProvider;
use crate::conversation::{ChatMessage, MessageType};
use crate::error::Result;

/// One capability per provider variant
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Which provider this transport talks to
    fn provider(&self) -> AiProvider;

    /// Non-streaming completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Lightweight connectivity check
    async fn probe(&self) -> Result<ProbeReport>;
}

/// A role-tagged prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: MessageType,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageType::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageType::Assistant,
            content: content.into(),
        }
    }
}

/// Request for completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model to use; filled from the active model when empty
    pub model: String,

    /// Messages in the conversation (no system messages)
    pub messages: Vec<PromptMessage>,

    /// System prompt
    pub system: Option<String>,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<PromptMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    /// Build a request from conversation history.
    ///
    /// System messages are joined into the system prompt.
    pub fn from_history(model: impl Into<String>, history: &[ChatMessage]) -> Self {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for message in history {
            match message.message_type {
                MessageType::System => system_parts.push(message.content.clone()),
                role => messages.push(PromptMessage {
                    role,
                    content: message.content.clone(),
                }),
            }
        }

        let mut request = Self::new(model, messages);
        if !system_parts.is_empty() {
            request.system = Some(system_parts.join("\n\n"));
        }
        request
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    /// Get total tokens used
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response from a completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// Response text
    pub content: String,

    /// Model reported by the provider
    pub model: String,

    /// Token usage
    pub usage: Usage,
}

/// Result of a successful probe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Server or model version, when the provider reports one
    pub model_version: Option<String>,
}

/// Outcome of `ProviderCatalog::test_connection`
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTestResult {
    pub is_successful: bool,
    pub response_time: Duration,
    pub model_version: Option<String>,
    pub error_message: Option<String>,
}

impl ConnectionTestResult {
    pub fn success(response_time: Duration, model_version: Option<String>) -> Self {
        Self {
            is_successful: true,
            response_time,
            model_version,
            error_message: None,
        }
    }

    pub fn failure(response_time: Duration, error_message: impl Into<String>) -> Self {
        Self {
            is_successful: false,
            response_time,
            model_version: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Provider-independent chat response envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub is_success: bool,
    pub content: Option<String>,
    pub error_message: Option<String>,
    pub model_used: Option<String>,
}

impl ChatResponse {
    pub fn success(content: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            is_success: true,
            content: Some(content.into()),
            error_message: None,
            model_used: Some(model_used.into()),
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            content: None,
            error_message: Some(error_message.into()),
            model_used: None,
        }
    }
}
