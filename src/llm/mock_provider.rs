// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock provider transport for testing
//!
//! A scripted [`ProviderTransport`] that records every request, so the
//! catalog can be exercised without making real API calls.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::AiProvider;
use crate::error::{AiderError, ApiError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ProbeReport, ProviderTransport, Usage,
};

/// A failure the mock can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Network,
    AuthenticationFailed,
    RateLimited(u32),
    Server(u16),
}

impl MockFailure {
    fn to_error(self) -> AiderError {
        let api = match self {
            MockFailure::Timeout => ApiError::Timeout,
            MockFailure::Network => ApiError::Network("connection refused".to_string()),
            MockFailure::AuthenticationFailed => ApiError::AuthenticationFailed,
            MockFailure::RateLimited(secs) => ApiError::RateLimited(secs),
            MockFailure::Server(status) => ApiError::ServerError {
                status,
                message: "mock server error".to_string(),
            },
        };
        AiderError::Api(api)
    }
}

/// One scripted outcome for `complete`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Reply(String),
    Fail(MockFailure),
}

/// A mock provider transport
#[derive(Clone)]
pub struct MockProvider {
    provider: AiProvider,
    /// Outcomes consumed in order by `complete`
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    /// Reply once the script is exhausted
    fallback: Arc<Mutex<String>>,
    /// Artificial latency for every call
    latency: Arc<Mutex<Duration>>,
    probe_failure: Arc<Mutex<Option<MockFailure>>>,
    model_version: Arc<Mutex<Option<String>>>,
    call_count: Arc<AtomicUsize>,
    probe_count: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a mock that answers "Mock response"
    pub fn new(provider: AiProvider) -> Self {
        Self {
            provider,
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new("Mock response".to_string())),
            latency: Arc::new(Mutex::new(Duration::ZERO)),
            probe_failure: Arc::new(Mutex::new(None)),
            model_version: Arc::new(Mutex::new(Some("mock-1.0".to_string()))),
            call_count: Arc::new(AtomicUsize::new(0)),
            probe_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the reply returned once the script is exhausted
    pub fn with_response(self, text: impl Into<String>) -> Self {
        *lock(&self.fallback) = text.into();
        self
    }

    /// Queue outcomes (consumed in order)
    pub fn with_outcomes(self, outcomes: Vec<MockOutcome>) -> Self {
        lock(&self.script).extend(outcomes);
        self
    }

    /// Queue `count` failures ahead of any scripted replies
    pub fn failing(self, failure: MockFailure, count: usize) -> Self {
        lock(&self.script).extend(std::iter::repeat(MockOutcome::Fail(failure)).take(count));
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.latency) = latency;
        self
    }

    /// Make `probe` fail
    pub fn with_probe_failure(self, failure: MockFailure) -> Self {
        *lock(&self.probe_failure) = Some(failure);
        self
    }

    /// Version reported by `probe`
    pub fn with_model_version(self, version: Option<&str>) -> Self {
        *lock(&self.model_version) = version.map(str::to_string);
        self
    }

    /// Number of times `complete` was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of times `probe` was called
    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    /// All recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// The last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    /// Reset counters and recorded requests
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.probe_count.store(0, Ordering::SeqCst);
        lock(&self.recorded_requests).clear();
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ProviderTransport for MockProvider {
    fn provider(&self) -> AiProvider {
        self.provider
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded_requests).push(request.clone());

        self.simulate_latency().await;

        let outcome = lock(&self.script).pop_front();
        let text = match outcome {
            Some(MockOutcome::Reply(text)) => text,
            Some(MockOutcome::Fail(failure)) => return Err(failure.to_error()),
            None => lock(&self.fallback).clone(),
        };

        let output_tokens = u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX);
        Ok(CompletionResponse {
            content: text,
            model: request.model,
            usage: Usage {
                input_tokens: 10,
                output_tokens,
            },
        })
    }

    async fn probe(&self) -> Result<ProbeReport> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(failure) = *lock(&self.probe_failure) {
            return Err(failure.to_error());
        }
        Ok(ProbeReport {
            model_version: lock(&self.model_version).clone(),
        })
    }
}
