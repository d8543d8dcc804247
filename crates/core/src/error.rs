//! Error taxonomy shared by every operation exposed to transports.

use thiserror::Error;

/// Result type used by the token and replication boundaries.
pub type CoreResult<T> = Result<T, Error>;

/// Coarse classification transports map to protocol status codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required field was missing or empty.
    InvalidInput,
    /// Bad credentials, an invalid/expired/malformed token or auth header.
    Unauthenticated,
    /// Unknown username or user id.
    NotFound,
    /// Duplicate registration (reported by the credential store).
    Conflict,
    /// Hashing, signing, configuration or storage failure.
    Internal,
    /// An undersized broker payload.
    Malformed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
            ErrorKind::Malformed => "malformed",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a core operation.
///
/// Every variant carries enough context (field, value) for a transport to
/// produce a specific message. Use [`Error::public_message`] for anything
/// shown to an untrusted caller: internal causes are withheld there.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("you must fill the '{field}' value")]
    InvalidInput { field: &'static str },

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("{entity} not found with {key}:{value}")]
    NotFound {
        entity: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl Error {
    pub fn invalid_input(field: &'static str) -> Self {
        Self::InvalidInput { field }
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn not_found(entity: &'static str, key: &'static str, value: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key,
            value: value.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
            Error::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Malformed(_) => ErrorKind::Malformed,
        }
    }

    /// Message safe to return to an untrusted caller.
    pub fn public_message(&self) -> String {
        match self {
            Error::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}
