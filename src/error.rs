// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for the Aider session layer
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for session and catalog operations
#[derive(Error, Debug)]
pub enum AiderError {
    /// Provider or backend transport errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Invalid input (blank message, bad id or key)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration failed validation; messages are kept verbatim
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    /// A dispatch was attempted with no active model
    #[error("No active model is set")]
    NoActiveModel,

    /// Session could not reach its backend during initialization
    #[error("Failed to initialize session")]
    SessionInitialization(#[source] Box<AiderError>),

    /// Backend is not connected
    #[error("Not connected to the Aider backend")]
    NotConnected,

    /// Operation on a disposed session
    #[error("Session has been disposed")]
    Disposed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conversation persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,
}

/// Result type alias for session and catalog operations
pub type Result<T> = std::result::Result<T, AiderError>;

impl AiderError {
    /// Whether this error is a timeout, directly or as an initialization cause
    pub fn is_timeout(&self) -> bool {
        match self {
            AiderError::Api(ApiError::Timeout) => true,
            AiderError::SessionInitialization(inner) => inner.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_invalid_configuration_joins_messages() {
        let err = AiderError::InvalidConfiguration(vec![
            "API key is required for ChatGPT".to_string(),
            "Max retries must be between 0 and 10".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("Invalid configuration"));
        assert!(text.contains("API key is required for ChatGPT; Max retries"));
    }

    #[test]
    fn test_session_initialization_preserves_cause() {
        let cause = AiderError::Api(ApiError::Network("connection refused".to_string()));
        let err = AiderError::SessionInitialization(Box::new(cause));

        assert_eq!(err.to_string(), "Failed to initialize session");
        let source = err.source().expect("cause should be preserved");
        assert!(source.to_string().contains("connection refused"));
    }

    #[test]
    fn test_disposed_message() {
        assert!(AiderError::Disposed.to_string().contains("disposed"));
    }

    #[test]
    fn test_no_active_model_message() {
        assert!(AiderError::NoActiveModel
            .to_string()
            .contains("No active model"));
    }

    #[test]
    fn test_api_error_timeout() {
        let err = ApiError::Timeout;
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_api_error_server_error() {
        let err = ApiError::ServerError {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_is_timeout_through_initialization() {
        let err = AiderError::SessionInitialization(Box::new(AiderError::Api(ApiError::Timeout)));
        assert!(err.is_timeout());
        assert!(!AiderError::NotConnected.is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AiderError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_from_api_error() {
        let err: AiderError = ApiError::AuthenticationFailed.into();
        assert!(err.to_string().contains("API error"));
    }
}
