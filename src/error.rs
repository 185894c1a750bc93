//! Error types for QuillKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using QuillError
pub type Result<T> = std::result::Result<T, QuillError>;

/// Unified error type for QuillKV operations
#[derive(Debug, Error)]
pub enum QuillError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    /// The log record could not be appended; the mutation was not applied.
    #[error("WAL write failed: {0}")]
    WalWrite(String),

    /// A log line could not be decoded. Replay stops at this line.
    #[error("WAL parse error at line {line}: {reason}")]
    WalParse { line: usize, reason: String },

    // -------------------------------------------------------------------------
    // Keyspace Errors
    // -------------------------------------------------------------------------
    #[error("Value for key '{key}' is not an integer: '{value}'")]
    NonIntegerValue { key: String, value: String },

    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Store has been dropped")]
    Dropped,

    // -------------------------------------------------------------------------
    // Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error("Invalid command: {0}")]
    Command(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QuillError {
    /// Build a parse error for the given 1-based line number
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        QuillError::WalParse {
            line,
            reason: reason.into(),
        }
    }
}
