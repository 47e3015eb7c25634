// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Backend transport
//!
//! The session talks to the Aider backend through [`BackendTransport`]:
//! connect, send-and-await-ack, and a stream of inbound messages. Replies
//! arrive on the inbound stream, correlated by the outbound message id.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::AiProvider;
use crate::conversation::{ChatMessage, MessageReference, MessageType};
use crate::error::{AiderError, ApiError, Result};
use crate::llm::providers::common::{build_client, check_status, join_url, map_send_error};

/// A user message on its way to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<MessageReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AiProvider>,
}

impl OutboundMessage {
    /// Outbound form of `message`, addressed to `model` on `provider`
    pub fn from_chat(
        message: &ChatMessage,
        provider: Option<AiProvider>,
        model: Option<String>,
    ) -> Self {
        Self {
            id: message.id,
            content: message.content.clone(),
            references: message.references.clone(),
            model,
            provider,
        }
    }
}

/// A message pushed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Id of the outbound message this answers; `None` when unsolicited
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_inbound_type", rename = "type")]
    pub message_type: MessageType,
}

fn default_inbound_type() -> MessageType {
    MessageType::Assistant
}

impl InboundMessage {
    /// Assistant reply to `id`
    pub fn reply(id: Uuid, content: impl Into<String>) -> Self {
        Self {
            reply_to: Some(id),
            content: content.into(),
            model: None,
            message_type: MessageType::Assistant,
        }
    }

    /// Unsolicited assistant message
    pub fn unsolicited(content: impl Into<String>) -> Self {
        Self {
            reply_to: None,
            content: content.into(),
            model: None,
            message_type: MessageType::Assistant,
        }
    }

    /// Conversation form of this message
    pub fn into_chat_message(self) -> ChatMessage {
        let mut message = match self.message_type {
            MessageType::User => ChatMessage::user(self.content),
            MessageType::Assistant => ChatMessage::assistant(self.content),
            MessageType::System => ChatMessage::system(self.content),
        };
        if let Some(model) = self.model {
            message = message.with_model(model);
        }
        if let Some(id) = self.reply_to {
            message = message.in_reply_to(id);
        }
        message
    }
}

/// Connection to the Aider backend
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Establish the connection
    async fn connect(&self) -> Result<()>;

    /// Deliver one message; returns once the backend acknowledged it
    async fn send(&self, message: &OutboundMessage) -> Result<()>;

    /// Hand over the inbound stream. Only the first call returns it.
    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>>;

    /// Release the connection
    async fn disconnect(&self) -> Result<()>;
}

/// Shared inbound channel for transports that push replies themselves
pub(crate) struct InboundChannel {
    tx: mpsc::UnboundedSender<InboundMessage>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
}

impl InboundChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub(crate) fn push(&self, message: InboundMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!(
                target: "aider_session.transport",
                "inbound receiver dropped; message discarded"
            );
        }
    }

    pub(crate) fn take(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        match self.rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// The Aider backend over HTTP.
///
/// `connect` checks `GET {base}/health`; `send` posts to `{base}/chat` and
/// pushes the JSON reply (`{content, model}`) onto the inbound stream.
pub struct HttpBackendTransport {
    client: Client,
    base_url: String,
    inbound: InboundChannel,
}

impl HttpBackendTransport {
    /// Create a transport whose requests are bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        reqwest::Url::parse(&base_url).map_err(|e| {
            AiderError::Config(format!("Invalid backend URL '{}': {}", base_url, e))
        })?;

        Ok(Self {
            client: build_client(timeout)?,
            base_url,
            inbound: InboundChannel::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct BackendReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl BackendTransport for HttpBackendTransport {
    async fn connect(&self) -> Result<()> {
        let response = self
            .client
            .get(join_url(&self.base_url, "health"))
            .send()
            .await
            .map_err(|e| map_send_error(e, "the Aider backend"))?;
        check_status(response, "").await?;

        tracing::debug!(
            target: "aider_session.transport",
            base_url = %self.base_url,
            "connected to backend"
        );
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let response = self
            .client
            .post(join_url(&self.base_url, "chat"))
            .json(message)
            .send()
            .await
            .map_err(|e| map_send_error(e, "the Aider backend"))?;
        let response = check_status(response, message.model.as_deref().unwrap_or_default()).await?;

        let text = response.text().await.map_err(AiderError::Http)?;
        if text.trim().is_empty() {
            // Plain acknowledgement; the reply will arrive some other way
            return Ok(());
        }

        let reply: BackendReply = serde_json::from_str(&text)
            .map_err(|e| AiderError::Api(ApiError::InvalidResponse(e.to_string())))?;
        if let Some(content) = reply.content {
            self.inbound.push(InboundMessage {
                reply_to: Some(message.id),
                content,
                model: reply.model,
                message_type: MessageType::Assistant,
            });
        }
        Ok(())
    }

    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        self.inbound.take()
    }

    async fn disconnect(&self) -> Result<()> {
        // Stateless over HTTP
        Ok(())
    }
}
