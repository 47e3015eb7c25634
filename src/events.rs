// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Typed change notifications
//!
//! Each event kind has its own [`EventRegistry`]. Handlers run synchronously,
//! in registration order, on the task that raised the event. The session's
//! delivery loop waits for handlers to return, so they must not block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ProviderConfiguration;
use crate::conversation::ChatMessage;
use crate::session::ConnectionStatus;

/// Handle returned by [`EventRegistry::subscribe`]
pub type SubscriptionId = u64;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered list of subscriber callbacks for one event kind
pub struct EventRegistry<E> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventRegistry<E> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_handlers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler<E>)>> {
        match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("event handler list lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Register a handler; returns an id usable with [`unsubscribe`](Self::unsubscribe)
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_handlers().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock_handlers();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() < before
    }

    /// Invoke every handler with `event`.
    ///
    /// The list is snapshotted first so handlers may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self
            .lock_handlers()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.lock_handlers().len()
    }

    /// Drop all handlers
    pub fn clear(&self) {
        self.lock_handlers().clear();
    }
}

/// The active model was switched or cleared
#[derive(Debug, Clone)]
pub struct ActiveModelChanged {
    pub previous: Option<ProviderConfiguration>,
    pub current: Option<ProviderConfiguration>,
}

/// The session moved between connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatusChanged {
    pub old: ConnectionStatus,
    pub new: ConnectionStatus,
}

/// One inbound message from the backend
#[derive(Debug, Clone)]
pub struct MessageReceived {
    pub message: ChatMessage,
}

/// A configuration key was written
#[derive(Debug, Clone)]
pub struct ConfigurationChanged {
    pub key: String,
    pub new_value: serde_json::Value,
}
