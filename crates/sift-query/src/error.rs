//! Error types for compilation and data access.

use sift_core::{CriteriaError, ModelError, StorageError, UpdateError};
use thiserror::Error;

/// Errors that make a whole compile fail
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Operator that cannot produce a predicate at this position
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    /// Field path that cannot be embedded in the native query
    #[error("Invalid field path: {0}")]
    InvalidField(String),

    #[error(transparent)]
    Criteria(#[from] CriteriaError),
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Caller-facing failure of a repository operation
#[derive(Error, Debug, Clone)]
pub enum DataAccessError {
    /// The request itself is invalid; the message says why
    #[error("Invalid data access: {0}")]
    InvalidDataAccess(String),

    /// A select list that does not cover the result type
    #[error("Invalid select for {model}: missing {missing:?}")]
    InvalidSelect { model: String, missing: Vec<String> },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for repository operations
pub type DataAccessResult<T> = Result<T, DataAccessError>;

impl From<UpdateError> for DataAccessError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::Storage(storage) => Self::Storage(storage),
            other => Self::InvalidDataAccess(other.to_string()),
        }
    }
}

impl From<CriteriaError> for DataAccessError {
    fn from(err: CriteriaError) -> Self {
        Self::InvalidDataAccess(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_errors_keep_their_message() {
        let err: DataAccessError = UpdateError::MissingMainId {
            model: "AdminUser".into(),
        }
        .into();

        assert!(matches!(err, DataAccessError::InvalidDataAccess(_)));
        assert!(err.to_string().contains("Main entity ID is required"));
    }

    #[test]
    fn test_storage_errors_stay_storage() {
        let err: DataAccessError = UpdateError::Storage(StorageError::backend("down")).into();
        assert!(matches!(err, DataAccessError::Storage(_)));
    }
}
