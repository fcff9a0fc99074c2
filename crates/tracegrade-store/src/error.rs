//! Error types for tracegrade-store

use thiserror::Error;

/// Errors raised by storage collaborators.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Record absent (or not visible to the caller's tenant)
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Write-once record written a second time
    #[error("{kind} already recorded: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// Digest string is not 64 hex chars
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Fixture or record payload could not be decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
