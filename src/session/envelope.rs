// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::config::{ProviderConfiguration, SessionOptions};
use crate::conversation::ChatMessage;
use crate::llm::retry::Backoff;

use super::transport::OutboundMessage;

/// Timeout and retry budget for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Bound on each attempt (connect, send and reply)
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl DeliveryPolicy {
    /// Policy of the active model
    pub fn from_config(config: &ProviderConfiguration) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
        }
    }

    /// Policy used when no model is active
    pub fn from_options(options: &SessionOptions) -> Self {
        Self {
            timeout: Duration::from_secs(u64::from(options.default_timeout_seconds.max(1))),
            max_retries: options.default_max_retries,
        }
    }

    /// Longest a caller waits: every attempt timing out, worst-case
    /// backoff between them, plus `grace`.
    pub fn caller_wait(&self, backoff: &Backoff, grace: Duration) -> Duration {
        self.timeout
            .saturating_mul(self.max_retries.saturating_add(1))
            .saturating_add(backoff.max_total_delay(self.max_retries))
            .saturating_add(grace)
    }
}

/// A queued message plus everything needed to deliver it
pub(crate) struct Envelope {
    pub(crate) message: ChatMessage,
    pub(crate) target: Option<ProviderConfiguration>,
    pub(crate) policy: DeliveryPolicy,
    pub(crate) attempts: u32,
    pub(crate) enqueued_at: Instant,
    pub(crate) completion: oneshot::Sender<ChatMessage>,
}

impl Envelope {
    pub(crate) fn new(
        message: ChatMessage,
        target: Option<ProviderConfiguration>,
        policy: DeliveryPolicy,
        completion: oneshot::Sender<ChatMessage>,
    ) -> Self {
        Self {
            message,
            target,
            policy,
            attempts: 0,
            enqueued_at: Instant::now(),
            completion,
        }
    }

    pub(crate) fn outbound(&self) -> OutboundMessage {
        OutboundMessage::from_chat(
            &self.message,
            self.target.as_ref().map(|t| t.provider),
            self.target
                .as_ref()
                .map(|t| t.model().trim().to_string())
                .filter(|m| !m.is_empty()),
        )
    }

    /// System message describing a terminal delivery failure
    pub(crate) fn failure_message(&self, timed_out: bool, error: &str) -> ChatMessage {
        let text = if timed_out {
            format!(
                "Request timed out after {} attempt(s); the Aider backend did not respond within {}s",
                self.attempts,
                self.policy.timeout.as_secs()
            )
        } else {
            format!(
                "Message delivery failed after {} attempt(s): {}",
                self.attempts, error
            )
        };
        ChatMessage::system(text).in_reply_to(self.message.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiProvider;

    #[test]
    fn test_caller_wait_covers_all_attempts() {
        let policy = DeliveryPolicy {
            timeout: Duration::from_secs(2),
            max_retries: 2,
        };
        let backoff = Backoff {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter: 0.0,
        };
        // 3 * 2s + (100 + 200)ms + 1s
        assert_eq!(
            policy.caller_wait(&backoff, Duration::from_secs(1)),
            Duration::from_millis(7300)
        );
    }

    #[test]
    fn test_policy_from_options_floors_timeout() {
        let options = SessionOptions {
            default_timeout_seconds: 0,
            ..SessionOptions::default()
        };
        assert_eq!(
            DeliveryPolicy::from_options(&options).timeout,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_outbound_carries_target() {
        let (tx, _rx) = oneshot::channel();
        let config = ProviderConfiguration::new(AiProvider::Claude)
            .with_api_key("k")
            .with_model("claude-3-5-haiku-latest");
        let envelope = Envelope::new(
            ChatMessage::user("hi"),
            Some(config.clone()),
            DeliveryPolicy::from_config(&config),
            tx,
        );

        let outbound = envelope.outbound();
        assert_eq!(outbound.provider, Some(AiProvider::Claude));
        assert_eq!(outbound.model.as_deref(), Some("claude-3-5-haiku-latest"));
        assert_eq!(outbound.id, envelope.message.id);
    }

    #[test]
    fn test_failure_message_mentions_timeout() {
        let (tx, _rx) = oneshot::channel();
        let mut envelope = Envelope::new(
            ChatMessage::user("hi"),
            None,
            DeliveryPolicy {
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
            tx,
        );
        envelope.attempts = 1;

        let message = envelope.failure_message(true, "Request timed out");
        assert!(message.content.contains("timed out"));
        assert_eq!(message.reply_to, Some(envelope.message.id));
    }

    #[test]
    fn test_failure_message_carries_error() {
        let (tx, _rx) = oneshot::channel();
        let mut envelope = Envelope::new(
            ChatMessage::user("hi"),
            None,
            DeliveryPolicy {
                timeout: Duration::from_secs(1),
                max_retries: 2,
            },
            tx,
        );
        envelope.attempts = 3;

        let message = envelope.failure_message(false, "Authentication failed");
        assert_eq!(
            message.content,
            "Message delivery failed after 3 attempt(s): Authentication failed"
        );
    }
}
