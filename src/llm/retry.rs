// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry logic for provider and backend calls with exponential backoff

use crate::error::{AiderError, ApiError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff policy shared by provider dispatch and session delivery.
///
/// The retry count is not part of the policy; it comes from the
/// configuration being dispatched to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Base delay in milliseconds (exponentially increased)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Jitter percentage (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter: 0.1,
        }
    }
}

impl Backoff {
    /// A policy that retries immediately. Useful in tests.
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
        }
    }

    fn capped_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms)
    }

    /// Calculate delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped_ms = self.capped_ms(attempt);

        let jitter_range = (capped_ms as f64 * self.jitter.clamp(0.0, 1.0)) as i64;
        let jitter_ms = if jitter_range > 0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        let final_ms = (capped_ms as i64 + jitter_ms).max(0) as u64;
        Duration::from_millis(final_ms)
    }

    /// Upper bound on the total time spent sleeping across `retries` retries
    pub fn max_total_delay(&self, retries: u32) -> Duration {
        let jitter = 1.0 + self.jitter.clamp(0.0, 1.0);
        let total_ms: u64 = (0..retries)
            .map(|attempt| (self.capped_ms(attempt) as f64 * jitter).ceil() as u64)
            .fold(0u64, |acc, ms| acc.saturating_add(ms));
        Duration::from_millis(total_ms)
    }
}

/// Determine if an error is transient and worth retrying
pub fn is_retryable(error: &AiderError) -> bool {
    match error {
        AiderError::Api(api_error) => match api_error {
            ApiError::Network(_) => true,
            ApiError::RateLimited(_) => true,
            ApiError::Timeout => true,
            ApiError::ServerError { status, .. } => (500..600).contains(status),

            ApiError::AuthenticationFailed => false,
            ApiError::ModelNotFound(_) => false,
            ApiError::InvalidResponse(_) => false,
        },
        AiderError::NotConnected => true,
        AiderError::Http(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// Retry an async operation with exponential backoff
///
/// # Arguments
/// * `operation` - The async operation to retry
/// * `max_retries` - Retries after the first attempt
/// * `backoff` - Delay policy between attempts
/// * `operation_name` - Name of the operation for logging
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    backoff: &Backoff,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        target: "aider_session.retry",
                        operation = operation_name,
                        attempts = attempt + 1,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::debug!(
                        target: "aider_session.retry",
                        operation = operation_name,
                        %error,
                        "non-retryable failure"
                    );
                    return Err(error);
                }

                if attempt >= max_retries {
                    tracing::warn!(
                        target: "aider_session.retry",
                        operation = operation_name,
                        max_retries,
                        %error,
                        "retries exhausted"
                    );
                    return Err(error);
                }

                let delay = backoff.delay_for(attempt);
                tracing::warn!(
                    target: "aider_session.retry",
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "transient failure, retrying"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
