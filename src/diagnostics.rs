// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Diagnostics sink and logging setup

use std::sync::Mutex;

use crate::error::{AiderError, Result};

/// Environment variable holding a tracing filter directive
pub const LOG_ENV_VAR: &str = "AIDER_SESSION_LOG";

/// Fire-and-forget diagnostics reported by the catalog and session
pub trait Diagnostics: Send + Sync {
    fn log_info(&self, message: &str, source: &str);
    fn log_warning(&self, message: &str, source: &str);
    fn handle_error(&self, error: &AiderError, source: &str);
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn log_info(&self, message: &str, source: &str) {
        tracing::info!(target: "aider_session", source, "{}", message);
    }

    fn log_warning(&self, message: &str, source: &str) {
        tracing::warn!(target: "aider_session", source, "{}", message);
    }

    fn handle_error(&self, error: &AiderError, source: &str) {
        tracing::error!(target: "aider_session", source, %error, "operation failed");
    }
}

/// Severity of a recorded entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// One recorded diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub level: DiagnosticLevel,
    pub message: String,
    pub source: String,
}

/// Records diagnostics in memory, also forwarding them to `tracing`.
/// Hosts use it to show recent problems; tests use it to assert on them.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, level: DiagnosticLevel, message: String, source: &str) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(DiagnosticEntry {
            level,
            message,
            source: source.to_string(),
        });
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Entries whose message contains `needle`
    pub fn matching(&self, needle: &str) -> Vec<DiagnosticEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.message.contains(needle))
            .collect()
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn log_info(&self, message: &str, source: &str) {
        TracingDiagnostics.log_info(message, source);
        self.record(DiagnosticLevel::Info, message.to_string(), source);
    }

    fn log_warning(&self, message: &str, source: &str) {
        TracingDiagnostics.log_warning(message, source);
        self.record(DiagnosticLevel::Warning, message.to_string(), source);
    }

    fn handle_error(&self, error: &AiderError, source: &str) {
        TracingDiagnostics.handle_error(error, source);
        self.record(DiagnosticLevel::Error, error.to_string(), source);
    }
}

/// Install a `tracing` fmt subscriber.
///
/// `AIDER_SESSION_LOG` takes precedence; otherwise warnings and above are
/// shown, and `verbose > 0` enables debug output for this crate.
pub fn init_logging(verbose: u8) -> Result<()> {
    let mut env_filter = match std::env::var(LOG_ENV_VAR) {
        Ok(directives) => tracing_subscriber::EnvFilter::new(directives),
        Err(_) => tracing_subscriber::EnvFilter::new("warn"),
    };

    if verbose > 0 && std::env::var(LOG_ENV_VAR).is_err() {
        if let Ok(parsed) = "aider_session=debug".parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| AiderError::Config(format!("Failed to initialize logging: {}", e)))
}
