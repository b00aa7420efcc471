//! Feed error types.

use companion_core::SourceError;
use thiserror::Error;

/// Errors that can occur while fetching a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed.
    #[error("Feed request failed: {0}")]
    RequestFailed(String),

    /// Response body was not a recognised feed document.
    #[error("Failed to parse feed response: {0}")]
    ParseError(String),

    /// Request timed out.
    #[error("Feed request timed out after {0}ms")]
    Timeout(u64),

    /// Feed host is unreachable.
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("All feed retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// Configuration error.
    #[error("Feed configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(0)
        } else if err.is_connect() {
            FeedError::Unavailable(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::RequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<FeedError> for SourceError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::ParseError(e) => SourceError::Parse(e),
            FeedError::Timeout(ms) => SourceError::Timeout(ms),
            FeedError::Unavailable(e) | FeedError::ConfigError(e) => SourceError::Unavailable(e),
            e @ (FeedError::RequestFailed(_) | FeedError::RetriesExhausted { .. }) => {
                SourceError::Request(e.to_string())
            }
        }
    }
}
