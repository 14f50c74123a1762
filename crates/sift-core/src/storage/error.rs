//! Storage Error Types
//!
//! Errors reported by the storage collaborators the core calls into.

use thiserror::Error;

/// Error type for storage collaborator operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Timeout error: operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Create a generic backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transaction(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(StorageError::Timeout { duration_ms: 500 }.is_retryable());
        assert!(StorageError::Transaction("deadlock".to_string()).is_retryable());
        assert!(!StorageError::backend("disk full").is_retryable());
        assert!(!StorageError::UnknownRelation("roles".to_string()).is_retryable());
    }
}
