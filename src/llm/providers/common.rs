// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};
use std::time::Duration;

use crate::conversation::MessageType;
use crate::error::{AiderError, ApiError, Result};

/// Default wait for a rate-limited request without a Retry-After header
pub(crate) const DEFAULT_RETRY_AFTER_SECS: u32 = 10;

/// Build an HTTP client whose requests are bounded by `timeout`.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(AiderError::Http)
}

/// Parse numeric Retry-After header (seconds).
pub(crate) fn parse_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Map a transport-level failure onto the API taxonomy.
pub(crate) fn map_send_error(error: reqwest::Error, provider: &str) -> AiderError {
    if error.is_timeout() {
        AiderError::Api(ApiError::Timeout)
    } else if error.is_connect() {
        AiderError::Api(ApiError::Network(format!(
            "Could not reach {}: {}",
            provider, error
        )))
    } else {
        AiderError::Http(error)
    }
}

/// Map a non-success status to an error.
pub(crate) fn status_error(
    status: u16,
    body: &str,
    retry_after: Option<u64>,
    model: &str,
) -> AiderError {
    let api = match status {
        401 | 403 => ApiError::AuthenticationFailed,
        404 => ApiError::ModelNotFound(model.to_string()),
        429 => ApiError::RateLimited(
            retry_after
                .and_then(|secs| u32::try_from(secs).ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        ),
        _ => ApiError::ServerError {
            status,
            message: error_message(body),
        },
    };
    AiderError::Api(api)
}

/// Check the response status, turning failures into errors.
pub(crate) async fn check_status(response: Response, model: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    // Extract Retry-After header before consuming response body
    let retry_after = parse_retry_after_seconds(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, retry_after, model))
}

/// Pull a human-readable message out of a JSON error body.
///
/// Understands `{"error": {"message": ..}}` and `{"error": ".."}`, falling
/// back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .map(str::to_string)
    });
    from_json.unwrap_or_else(|| body.trim().to_string())
}

/// Wire name of a chat role
pub(crate) fn role_name(role: MessageType) -> &'static str {
    match role {
        MessageType::User => "user",
        MessageType::Assistant => "assistant",
        MessageType::System => "system",
    }
}

/// Join `base` and `path`, tolerating a trailing slash on the base.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
