//! Error types for criteria, models and updates

use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised while reading criteria
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CriteriaError {
    /// Operator name outside the supported vocabulary
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Wire parameter that cannot be decoded
    #[error("Malformed parameter {name}: {message}")]
    MalformedParameter { name: String, message: String },
}

/// Result type for criteria decoding
pub type CriteriaResult<T> = Result<T, CriteriaError>;

/// Errors raised while deriving or using model descriptors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Records construct every component, so nothing can be skipped
    #[error("Record model {model} can not have ignored field {field}")]
    IgnoredFieldOnRecord { model: String, field: String },

    /// A record component holding a nested type must be declared as a sub-model
    #[error("Record model {model} does not support nested model type on field {field}")]
    NestedTypeOnRecord { model: String, field: String },

    /// Two fields share a target name
    #[error("Model {model} declares field {field} more than once")]
    DuplicateField { model: String, field: String },

    /// No descriptor registered under this name
    #[error("Model {0} is not registered")]
    UnknownModel(String),

    /// Value could not be converted to or from the model
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }
}

/// Fatal update-cascade failures.
///
/// All of these are raised before the first write.
#[derive(Error, Debug, Clone)]
pub enum UpdateError {
    #[error("Update payload cannot be null")]
    NullPayload,

    #[error("Update payload type {0} must be annotated as an update model")]
    NotAnUpdateModel(String),

    #[error("Main entity ID is required for update model {model}")]
    MissingMainId { model: String },

    #[error("No entity found with ID {id} for {relation}")]
    EntityNotFound { relation: String, id: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for update operations
pub type UpdateResult<T> = Result<T, UpdateError>;

impl UpdateError {
    /// Check if the failure came from validating the payload rather than storage
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
