// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session service
//!
//! Owns the conversation with the Aider backend. A single delivery loop
//! sends queued messages one at a time, so replies come back in send order.
//! An inbound pump turns backend messages into history entries and events.

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::envelope::{DeliveryPolicy, Envelope};
use super::state::ConnectionStatus;
use super::transport::{BackendTransport, InboundMessage};
use crate::config::SessionOptions;
use crate::conversation::{
    ChatMessage, Conversation, ConversationStore, ConversationSummary, MessageReference,
};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{AiderError, ApiError, Result};
use crate::events::{ConnectionStatusChanged, EventRegistry, MessageReceived};
use crate::llm::catalog::ProviderCatalog;
use crate::llm::retry::is_retryable;

const SOURCE: &str = "SessionService";
const DEFAULT_TITLE: &str = "Aider session";
/// How many finished message ids are remembered for dropping late replies
const SETTLED_CAPACITY: usize = 256;

/// Reply waiters keyed by outbound message id, plus the ids whose delivery
/// already finished
#[derive(Default)]
struct PendingReplies {
    waiting: HashMap<Uuid, oneshot::Sender<ChatMessage>>,
    settled: HashSet<Uuid>,
    settled_order: VecDeque<Uuid>,
}

impl PendingReplies {
    fn register(&mut self, id: Uuid, waiter: oneshot::Sender<ChatMessage>) {
        self.waiting.insert(id, waiter);
    }

    /// Mark `id` finished, returning its waiter if still registered
    fn settle(&mut self, id: Uuid) -> Option<oneshot::Sender<ChatMessage>> {
        let waiter = self.waiting.remove(&id);
        if self.settled.insert(id) {
            self.settled_order.push_back(id);
            if self.settled_order.len() > SETTLED_CAPACITY {
                if let Some(oldest) = self.settled_order.pop_front() {
                    self.settled.remove(&oldest);
                }
            }
        }
        waiter
    }

    fn is_settled(&self, id: &Uuid) -> bool {
        self.settled.contains(id)
    }

    fn clear(&mut self) {
        self.waiting.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(target: "aider_session.session", "session lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// A failure that means the connection is gone
fn is_connection_error(error: &AiderError) -> bool {
    match error {
        AiderError::Api(ApiError::Network(_)) | AiderError::NotConnected => true,
        AiderError::Http(e) => e.is_connect(),
        _ => false,
    }
}

/// State shared by the service handle and its background tasks
struct SessionInner {
    transport: Arc<dyn BackendTransport>,
    store: Arc<dyn ConversationStore>,
    catalog: Option<Arc<ProviderCatalog>>,
    diagnostics: Arc<dyn Diagnostics>,
    options: SessionOptions,
    status: Mutex<ConnectionStatus>,
    /// Serializes connect and shutdown
    connect_lock: tokio::sync::Mutex<()>,
    history: RwLock<Conversation>,
    /// Delivery waiters keyed by outbound message id
    pending: Mutex<PendingReplies>,
    disposed: AtomicBool,
    message_received: EventRegistry<MessageReceived>,
    connection_status_changed: EventRegistry<ConnectionStatusChanged>,
}

impl SessionInner {
    fn status(&self) -> ConnectionStatus {
        *lock(&self.status)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingReplies> {
        lock(&self.pending)
    }

    /// Move to `next` and notify. Illegal or no-op transitions are ignored.
    fn transition(&self, next: ConnectionStatus) -> bool {
        let old = {
            let mut status = lock(&self.status);
            let old = *status;
            if old == next || !old.can_transition_to(next) {
                return false;
            }
            *status = next;
            old
        };

        tracing::debug!(
            target: "aider_session.session",
            %old,
            new = %next,
            "connection status changed"
        );
        self.connection_status_changed
            .emit(&ConnectionStatusChanged { old, new: next });
        true
    }

    async fn ensure_connected(&self) -> Result<()> {
        let _connect = self.connect_lock.lock().await;

        match self.status() {
            ConnectionStatus::Connected => return Ok(()),
            ConnectionStatus::Disposed => return Err(AiderError::Disposed),
            ConnectionStatus::Disconnected | ConnectionStatus::Connecting => {}
        }

        self.transition(ConnectionStatus::Connecting);
        match self.transport.connect().await {
            Ok(()) => {
                self.transition(ConnectionStatus::Connected);
                if self.is_disposed() {
                    return Err(AiderError::Disposed);
                }
                Ok(())
            }
            Err(error) => {
                self.transition(ConnectionStatus::Disconnected);
                Err(error)
            }
        }
    }

    /// Deliver one envelope, retrying transient failures.
    ///
    /// The reply waiter is registered once, so a late reply to an earlier
    /// attempt still completes a later one.
    async fn deliver(&self, envelope: &mut Envelope) -> Result<ChatMessage> {
        let id = envelope.message.id;
        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.lock_pending().register(id, reply_tx);

        let outbound = envelope.outbound();
        let policy = envelope.policy;
        let backoff = self.options.backoff();

        let result = loop {
            envelope.attempts += 1;

            let attempt = async {
                self.ensure_connected().await?;
                self.transport.send(&outbound).await?;
                (&mut reply_rx).await.map_err(|_| AiderError::Disposed)
            };
            let error = match tokio::time::timeout(policy.timeout, attempt).await {
                Ok(Ok(reply)) => break Ok(reply),
                Ok(Err(error)) => error,
                Err(_) => AiderError::Api(ApiError::Timeout),
            };

            if self.is_disposed() {
                break Err(AiderError::Disposed);
            }
            // A connect cut short by the timeout leaves us Connecting
            if is_connection_error(&error) || self.status() == ConnectionStatus::Connecting {
                self.transition(ConnectionStatus::Disconnected);
            }
            if !is_retryable(&error) || envelope.attempts > policy.max_retries {
                break Err(error);
            }

            let delay = backoff.delay_for(envelope.attempts - 1);
            tracing::warn!(
                target: "aider_session.session",
                message_id = %id,
                attempt = envelope.attempts,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                %error,
                "delivery attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        self.lock_pending().settle(id);
        result
    }

    /// Resolve the caller of a delivered (or failed) envelope
    async fn finish(&self, envelope: Envelope, outcome: Result<ChatMessage>) {
        match outcome {
            Ok(reply) => {
                tracing::debug!(
                    target: "aider_session.session",
                    message_id = %envelope.message.id,
                    attempts = envelope.attempts,
                    elapsed_ms = envelope.enqueued_at.elapsed().as_millis() as u64,
                    "message delivered"
                );
                let _ = envelope.completion.send(reply);
            }
            Err(AiderError::Disposed) => {
                tracing::debug!(
                    target: "aider_session.session",
                    message_id = %envelope.message.id,
                    "delivery abandoned, session disposed"
                );
            }
            Err(error) => {
                self.diagnostics.handle_error(&error, SOURCE);
                let failure = envelope.failure_message(
                    error.is_timeout() || is_connection_error(&error),
                    &error.to_string(),
                );
                if !self.is_disposed() {
                    self.history.write().await.push(failure.clone());
                }
                let _ = envelope.completion.send(failure);
            }
        }
    }

    async fn accept_inbound(&self, inbound: InboundMessage) {
        if self.is_disposed() {
            return;
        }

        // Each outbound message gets at most one reply
        if let Some(id) = inbound.reply_to {
            if self.lock_pending().is_settled(&id) {
                tracing::debug!(
                    target: "aider_session.session",
                    reply_to = %id,
                    "dropping reply to a message that already finished"
                );
                return;
            }
        }

        let message = inbound.into_chat_message();
        self.history.write().await.push(message.clone());
        self.message_received.emit(&MessageReceived {
            message: message.clone(),
        });

        if let Some(id) = message.reply_to {
            let waiter = self.lock_pending().settle(id);
            if let Some(waiter) = waiter {
                let _ = waiter.send(message);
            }
        }
    }
}

async fn delivery_loop(
    inner: Arc<SessionInner>,
    mut queue: mpsc::UnboundedReceiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let mut envelope = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = queue.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };
        if inner.is_disposed() {
            break;
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            outcome = inner.deliver(&mut envelope) => outcome,
        };
        inner.finish(envelope, outcome).await;
    }

    tracing::debug!(target: "aider_session.session", "delivery loop stopped");
}

async fn inbound_pump(
    inner: Arc<SessionInner>,
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = inbound.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };
        inner.accept_inbound(message).await;
    }

    tracing::debug!(target: "aider_session.session", "inbound pump stopped");
}

/// Builder for [`SessionService`]
#[derive(Default)]
pub struct SessionServiceBuilder {
    transport: Option<Arc<dyn BackendTransport>>,
    store: Option<Arc<dyn ConversationStore>>,
    catalog: Option<Arc<ProviderCatalog>>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
    options: SessionOptions,
}

impl SessionServiceBuilder {
    pub fn transport(mut self, transport: Arc<dyn BackendTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Catalog whose active model sets the delivery timeout and retries
    pub fn catalog(mut self, catalog: Arc<ProviderCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the service and start its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<SessionService> {
        let transport = self.transport.ok_or_else(|| {
            AiderError::Config("A session needs a backend transport".to_string())
        })?;
        let store = self.store.ok_or_else(|| {
            AiderError::Config("A session needs a conversation store".to_string())
        })?;
        if self.options.session_key.trim().is_empty() {
            return Err(AiderError::Config(
                "Session key cannot be empty".to_string(),
            ));
        }

        let inbound = transport.take_inbound();
        let inner = Arc::new(SessionInner {
            transport,
            store,
            catalog: self.catalog,
            diagnostics: self
                .diagnostics
                .unwrap_or_else(|| Arc::new(TracingDiagnostics)),
            history: RwLock::new(Conversation::new(
                self.options.session_key.clone(),
                DEFAULT_TITLE,
            )),
            options: self.options,
            status: Mutex::new(ConnectionStatus::Disconnected),
            connect_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(PendingReplies::default()),
            disposed: AtomicBool::new(false),
            message_received: EventRegistry::new(),
            connection_status_changed: EventRegistry::new(),
        });

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut workers = vec![tokio::spawn(delivery_loop(
            inner.clone(),
            queue_rx,
            shutdown_rx.clone(),
        ))];
        match inbound {
            Some(inbound) => workers.push(tokio::spawn(inbound_pump(
                inner.clone(),
                inbound,
                shutdown_rx,
            ))),
            None => inner.diagnostics.log_warning(
                "Backend transport has no inbound stream; replies will not be received",
                SOURCE,
            ),
        }

        Ok(SessionService {
            inner,
            queue: queue_tx,
            shutdown: shutdown_tx,
            workers,
        })
    }
}

/// Conversation with the Aider backend
pub struct SessionService {
    inner: Arc<SessionInner>,
    queue: mpsc::UnboundedSender<Envelope>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl SessionService {
    pub fn builder() -> SessionServiceBuilder {
        SessionServiceBuilder::default()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.is_disposed() {
            return Err(AiderError::Disposed);
        }
        Ok(())
    }

    async fn current_target(&self) -> Option<crate::config::ProviderConfiguration> {
        match &self.inner.catalog {
            Some(catalog) => catalog.active_model().await,
            None => None,
        }
    }

    /// Connect to the backend.
    ///
    /// Failure is wrapped in [`AiderError::SessionInitialization`] and the
    /// session stays `Disconnected`; history and persistence keep working.
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_live()?;

        let policy = match self.current_target().await {
            Some(target) => DeliveryPolicy::from_config(&target),
            None => DeliveryPolicy::from_options(&self.inner.options),
        };

        let outcome = tokio::time::timeout(policy.timeout, self.inner.ensure_connected()).await;
        let error = match outcome {
            Ok(Ok(())) => {
                self.inner
                    .diagnostics
                    .log_info("Connected to the Aider backend", SOURCE);
                return Ok(());
            }
            Ok(Err(error)) => error,
            Err(_) => {
                self.inner.transition(ConnectionStatus::Disconnected);
                AiderError::Api(ApiError::Timeout)
            }
        };

        let error = AiderError::SessionInitialization(Box::new(error));
        self.inner.diagnostics.handle_error(&error, SOURCE);
        Err(error)
    }

    /// Send plain text with optional references
    pub async fn send_message(
        &self,
        text: &str,
        references: Vec<MessageReference>,
    ) -> Result<ChatMessage> {
        self.ensure_live()?;
        if text.trim().is_empty() {
            return Err(AiderError::InvalidInput(
                "Message content is required".to_string(),
            ));
        }
        self.send_chat_message(ChatMessage::user(text).with_references(references))
            .await
    }

    /// Send a structured message.
    ///
    /// The message joins the history immediately and is queued for
    /// delivery. The result is the backend's reply, or a System message
    /// describing why there is none.
    pub async fn send_chat_message(&self, message: ChatMessage) -> Result<ChatMessage> {
        self.ensure_live()?;
        let errors = message.validation_errors();
        if !errors.is_empty() {
            return Err(AiderError::InvalidInput(errors.join("; ")));
        }

        let target = self.current_target().await;
        let policy = match &target {
            Some(target) => DeliveryPolicy::from_config(target),
            None => DeliveryPolicy::from_options(&self.inner.options),
        };
        let wait = policy.caller_wait(
            &self.inner.options.backoff(),
            self.inner.options.response_grace(),
        );

        let (completion_tx, completion_rx) = oneshot::channel();
        {
            // History order matches queue order
            let mut history = self.inner.history.write().await;
            self.queue
                .send(Envelope::new(message.clone(), target, policy, completion_tx))
                .map_err(|_| AiderError::Disposed)?;
            history.push(message.clone());
        }

        match tokio::time::timeout(wait, completion_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AiderError::Disposed),
            Err(_) => {
                let timed_out = ChatMessage::system(format!(
                    "Request timed out after waiting {}s for the Aider backend",
                    wait.as_secs()
                ))
                .in_reply_to(message.id);
                self.inner.diagnostics.log_warning(&timed_out.content, SOURCE);
                self.inner.history.write().await.push(timed_out.clone());
                Ok(timed_out)
            }
        }
    }

    /// Copy of the in-memory history
    pub async fn get_chat_history(&self) -> Result<Vec<ChatMessage>> {
        self.ensure_live()?;
        Ok(self.inner.history.read().await.messages.clone())
    }

    /// Clear the in-memory history. Saved and archived conversations are untouched.
    pub async fn clear_chat_history(&self) -> Result<()> {
        self.ensure_live()?;
        self.inner.history.write().await.clear();
        self.inner.diagnostics.log_info("Chat history cleared", SOURCE);
        Ok(())
    }

    /// Persist the history under the session key
    pub async fn save_conversation(&self) -> Result<()> {
        self.ensure_live()?;
        let snapshot = self.inner.history.read().await.clone();
        self.inner.store.save_conversation(&snapshot).await
    }

    /// Replace the history with the saved conversation.
    ///
    /// Returns false, leaving the history alone, when nothing is saved.
    pub async fn load_conversation(&self) -> Result<bool> {
        self.ensure_live()?;
        let loaded = self
            .inner
            .store
            .load_conversation(&self.inner.options.session_key)
            .await?;

        match loaded {
            Some(conversation) => {
                let count = conversation.len();
                *self.inner.history.write().await = conversation;
                self.inner.diagnostics.log_info(
                    &format!("Loaded conversation with {} messages", count),
                    SOURCE,
                );
                Ok(true)
            }
            None => {
                self.inner
                    .diagnostics
                    .log_info("No saved conversation found", SOURCE);
                Ok(false)
            }
        }
    }

    /// Archive the history under `name` (default `archive_YYYYMMDD_HHMMSS`)
    /// and clear it. The history is cleared even if archiving fails.
    pub async fn archive_conversation(&self, name: Option<&str>) -> Result<String> {
        self.ensure_live()?;
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => Utc::now().format("archive_%Y%m%d_%H%M%S").to_string(),
        };

        let snapshot = self.inner.history.read().await.clone();
        let archived = async {
            self.inner.store.save_conversation(&snapshot).await?;
            self.inner
                .store
                .archive_conversation(&snapshot.id, &name)
                .await
        }
        .await;

        self.inner.history.write().await.clear();

        match archived {
            Ok(_) => {
                self.inner.diagnostics.log_info(
                    &format!("Conversation archived as {}", name),
                    SOURCE,
                );
                Ok(name)
            }
            Err(error) => {
                self.inner.diagnostics.handle_error(&error, SOURCE);
                Err(error)
            }
        }
    }

    /// Saved conversations, most recent first
    pub async fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>> {
        self.ensure_live()?;
        self.inner.store.conversation_summaries().await
    }

    /// Delete a saved conversation
    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        self.ensure_live()?;
        self.inner.store.delete_conversation(id).await
    }

    /// Disconnect without disposing; [`initialize`](Self::initialize) may follow.
    pub async fn shutdown(&self) -> Result<()> {
        self.ensure_live()?;
        let _connect = self.inner.connect_lock.lock().await;
        let result = self.inner.transport.disconnect().await;
        self.inner.transition(ConnectionStatus::Disconnected);
        result
    }

    /// Tear the session down. Safe to call more than once.
    ///
    /// Queued and in-flight messages are abandoned; their callers get
    /// [`AiderError::Disposed`].
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.diagnostics.log_info("Session disposed", SOURCE);
        self.inner.transition(ConnectionStatus::Disposed);
        let _ = self.shutdown.send(true);
        self.inner.lock_pending().clear();

        if let Err(error) = self.inner.transport.disconnect().await {
            self.inner.diagnostics.log_warning(
                &format!("Backend disconnect failed during dispose: {}", error),
                SOURCE,
            );
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.status()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status() == ConnectionStatus::Connected
    }

    /// Fired once per inbound backend message
    pub fn on_message_received(&self) -> &EventRegistry<MessageReceived> {
        &self.inner.message_received
    }

    /// Fired on every connection state transition
    pub fn on_connection_status_changed(&self) -> &EventRegistry<ConnectionStatusChanged> {
        &self.inner.connection_status_changed
    }

    /// Key of the live conversation slot
    pub fn session_key(&self) -> &str {
        &self.inner.options.session_key
    }
}

impl Drop for SessionService {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}
