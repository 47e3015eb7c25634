// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Aider session - AI provider catalog and message delivery for IDE integrations.
//!
//! This crate exposes the runtime an editor extension uses to talk to Aider:
//! - `config`: provider configurations, settings document and key/value store
//! - `llm`: provider transports (OpenAI/Claude/Ollama) and the catalog that owns the active model
//! - `session`: queued, retried delivery to the Aider backend with connection tracking
//! - `conversation`: chat messages, conversations and their file persistence
//! - `events`, `diagnostics`: change notifications and the logging seam

pub mod config;
pub mod conversation;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod llm;
pub mod session;

pub use error::{AiderError, ApiError, Result};
