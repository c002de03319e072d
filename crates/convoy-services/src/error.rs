//! Service error taxonomy.

use convoy_state::StateError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The operation named a record that does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The input was rejected before anything was stored.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record store could not read or write the collection.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StateError),
}

impl ServiceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
