//! Error types for basic-memory-core

use thiserror::Error;

/// Main error type for the basic-memory-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for a markdown file
    #[error("parse error in {file}: {reason}")]
    Parse { file: String, reason: String },

    /// Unique-key violation during an entity upsert
    #[error("permalink conflict: {permalink}")]
    Conflict { permalink: String },

    /// Invalid timeframe string at a query boundary
    #[error("invalid timeframe: {0}")]
    Timeframe(String),

    /// Malformed search query (bad metadata filter, empty text)
    #[error("invalid search query: {0}")]
    Query(String),

    /// Invalid memory:// URL
    #[error("invalid memory url: {0}")]
    MemoryUrl(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem watcher error
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Unrecoverable engine error
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// Build a parse error for a specific file.
    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Attach a file path to a parse error that was produced without one.
    pub fn with_file(self, file: &str) -> Self {
        match self {
            Error::Parse { reason, .. } => Error::Parse {
                file: file.to_string(),
                reason,
            },
            other => other,
        }
    }
}

/// Result type alias for basic-memory-core
pub type Result<T> = std::result::Result<T, Error>;
