//! Error types for the companion core library.

use thiserror::Error;

use crate::types::RecordId;

/// Top-level error type for configuration and persistence operations.
///
/// Classification, policy evaluation and the pipeline entry point never
/// return this type: they degrade instead of failing.
#[derive(Error, Debug)]
pub enum CompanionError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lexicon document failed load-time validation.
    #[error("Lexicon error in '{domain}': {reason}")]
    Lexicon {
        /// Domain id (or file name when the domain could not be read).
        domain: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A conversation record with the given ID was not found.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompanionError {
    /// Shorthand for a [`CompanionError::Lexicon`] error.
    pub(crate) fn lexicon(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lexicon {
            domain: domain.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of an outbound information source.
///
/// These never reach the pipeline caller: the information cache converts
/// every one of them into the fallback item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transport-level failure (connect, HTTP status, ...).
    #[error("Fetch request failed: {0}")]
    Request(String),

    /// The source answered but the payload could not be decoded.
    #[error("Failed to parse feed payload: {0}")]
    Parse(String),

    /// The fetch exceeded its time bound.
    #[error("Fetch timed out after {0}ms")]
    Timeout(u64),

    /// The source answered with zero items.
    #[error("Source returned no items")]
    Empty,

    /// No source is registered or the source is offline.
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CompanionError>;
