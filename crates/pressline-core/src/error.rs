//! Pressline error types.
//!
//! These cover command validation and infrastructure failures only.
//! Delivery outcomes are never errors: backends always return a
//! [`crate::types::NotifierResult`] and the dispatcher branches on it.

use thiserror::Error;

/// Errors raised synchronously to a command's caller.
#[derive(Debug, Error)]
pub enum PresslineError {
    /// A create/update violated the data model (kind/channel mismatch,
    /// duplicate schedule, missing field). Programming or data error,
    /// not an operational one.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Attempt to mutate a record that is already Sent/Failed/Canceled.
    #[error("Notification {0} is already in a terminal state")]
    AlreadySent(String),

    /// Record lookup failed.
    #[error("Notification not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed on commit.
    #[error("Version conflict writing notification {reference}: expected v{expected}")]
    VersionConflict { reference: String, expected: u64 },

    /// Configuration loading/parsing error.
    #[error("Config error: {0}")]
    Config(String),

    /// Persistence layer error.
    #[error("Store error: {0}")]
    Store(String),

    /// Scheduler substrate error.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Search index error.
    #[error("Index error: {0}")]
    Index(String),

    /// Credential decryption error.
    #[error("Security error: {0}")]
    Security(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PresslineError>;

impl PresslineError {
    /// True for the "already sent" terminal-state guard.
    pub fn is_terminal_guard(&self) -> bool {
        matches!(self, PresslineError::AlreadySent(_))
    }
}
