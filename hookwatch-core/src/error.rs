//! Error types for hookwatch-core

use thiserror::Error;

/// Main error type for the hookwatch-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A lock guarding shared state was poisoned by a panicking holder
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// Host process enumeration failed
    #[error("process enumeration error: {0}")]
    Process(String),

    /// A bounded operation did not finish in time
    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: &'static str, millis: u64 },

    /// A blocking task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),

    /// Conversation not found
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
}

/// Result type alias for hookwatch-core
pub type Result<T> = std::result::Result<T, Error>;
