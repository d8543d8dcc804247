//! Failure model for storage collaborators (credential store, replica store).

use thiserror::Error;

use crate::Error;

/// Storage collaborator error.
///
/// These are **infrastructure errors** as opposed to the classified
/// [`Error`] returned to transports; the conversion below decides which
/// storage conditions callers may learn about.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found with {key}:{value}")]
    NotFound {
        entity: &'static str,
        key: &'static str,
        value: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("duplicate record: {0}")]
    Conflict(String),

    /// Connection, query or decoding failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: &'static str, value: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key,
            value: value.to_string(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<StoreError> for Error {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, key, value } => Error::NotFound { entity, key, value },
            StoreError::Conflict(msg) => Error::Conflict(msg),
            StoreError::Backend(msg) => Error::Internal(msg),
        }
    }
}
