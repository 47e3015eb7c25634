// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock backend transport for testing
//!
//! Scripted replies, connection failure injection and a record of every
//! message sent.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use super::transport::{BackendTransport, InboundChannel, InboundMessage, OutboundMessage};
use crate::error::{AiderError, ApiError, Result};

/// What the mock does with the next message it is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Acknowledge and reply immediately
    Reply(String),
    /// Acknowledge and reply after a delay
    Delayed(Duration, String),
    /// Acknowledge but never reply
    Silent,
    /// Fail the send with a network error and drop the connection
    NetworkError,
}

/// A mock backend transport
#[derive(Clone)]
pub struct MockBackend {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    connect_failures: Arc<AtomicUsize>,
    connect_count: Arc<AtomicUsize>,
    disconnect_count: Arc<AtomicUsize>,
    connected: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    inbound: Arc<InboundChannel>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock backend lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A backend that echoes every message as "Echo: {content}"
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            connect_failures: Arc::new(AtomicUsize::new(0)),
            connect_count: Arc::new(AtomicUsize::new(0)),
            disconnect_count: Arc::new(AtomicUsize::new(0)),
            connected: Arc::new(AtomicBool::new(false)),
            sent: Arc::new(Mutex::new(Vec::new())),
            inbound: Arc::new(InboundChannel::new()),
        }
    }

    /// Queue replies (consumed in order, then echo)
    pub fn with_replies(self, replies: Vec<MockReply>) -> Self {
        lock(&self.script).extend(replies);
        self
    }

    /// Never reply to anything
    pub fn silent(self) -> Self {
        self.with_replies(vec![MockReply::Silent; 64])
    }

    /// Fail the next `count` connection attempts
    pub fn failing_connections(self, count: usize) -> Self {
        self.connect_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Push a message the session did not ask for
    pub fn push_unsolicited(&self, content: impl Into<String>) {
        self.inbound.push(InboundMessage::unsolicited(content));
    }

    /// Every message sent, in order
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        lock(&self.sent).clone()
    }

    /// Content of every message sent, in order
    pub fn sent_contents(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|m| m.content.clone()).collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendTransport for MockBackend {
    async fn connect(&self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AiderError::Api(ApiError::Network(
                "connection refused".to_string(),
            )));
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(AiderError::NotConnected);
        }
        lock(&self.sent).push(message.clone());

        let reply = lock(&self.script).pop_front();
        match reply {
            None => self
                .inbound
                .push(InboundMessage::reply(message.id, format!("Echo: {}", message.content))),
            Some(MockReply::Reply(text)) => self.inbound.push(InboundMessage::reply(message.id, text)),
            Some(MockReply::Delayed(delay, text)) => {
                let inbound = self.inbound.clone();
                let id = message.id;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inbound.push(InboundMessage::reply(id, text));
                });
            }
            Some(MockReply::Silent) => {}
            Some(MockReply::NetworkError) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(AiderError::Api(ApiError::Network(
                    "connection reset by peer".to_string(),
                )));
            }
        }
        Ok(())
    }

    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        self.inbound.take()
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ChatMessage;

    fn outbound(content: &str) -> OutboundMessage {
        OutboundMessage::from_chat(&ChatMessage::user(content), None, None)
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.send(&outbound("hi")).await,
            Err(AiderError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_echo_by_default() {
        let backend = MockBackend::new();
        let mut inbound = backend.take_inbound().unwrap();
        backend.connect().await.unwrap();

        let message = outbound("hi");
        backend.send(&message).await.unwrap();

        let reply = inbound.recv().await.unwrap();
        assert_eq!(reply.content, "Echo: hi");
        assert_eq!(reply.reply_to, Some(message.id));
        assert_eq!(backend.sent_contents(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_failures_then_success() {
        let backend = MockBackend::new().failing_connections(2);
        assert!(backend.connect().await.is_err());
        assert!(backend.connect().await.is_err());
        assert!(backend.connect().await.is_ok());
        assert_eq!(backend.connect_count(), 3);
        assert!(backend.is_connected());
    }

    #[tokio::test]
    async fn test_network_error_drops_connection() {
        let backend = MockBackend::new().with_replies(vec![MockReply::NetworkError]);
        backend.connect().await.unwrap();

        assert!(backend.send(&outbound("hi")).await.is_err());
        assert!(!backend.is_connected());
    }

    #[tokio::test]
    async fn test_push_unsolicited() {
        let backend = MockBackend::new();
        let mut inbound = backend.take_inbound().unwrap();
        backend.push_unsolicited("heads up");

        let message = inbound.recv().await.unwrap();
        assert!(message.reply_to.is_none());
        assert_eq!(message.content, "heads up");
    }
}
