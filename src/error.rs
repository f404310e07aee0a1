//! Error taxonomy for session and token operations.
//!
//! `AuthError` is what the session manager, token issuer and authorization
//! gate return. Storage collaborators speak `StorageError`, which is wrapped
//! (never swallowed) on its way up.

use std::time::Duration;
use thiserror::Error;

/// Failures raised by the user, role and refresh-token stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The per-operation deadline elapsed before the store answered.
    #[error("storage operation `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The blocking worker running the query panicked or was cancelled.
    #[error("storage worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// Any other backend failure (injected faults, constraint violations).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Timeout { .. })
    }
}

/// Errors surfaced by the session lifecycle core.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required input was missing or empty.
    #[error("invalid parameter: {0}")]
    BadInput(&'static str),

    /// Identity, role or token is absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Signature failure, expiry, claim decode failure, or an expired/absent
    /// refresh token.
    #[error("invalid token")]
    InvalidToken,

    /// The token is valid but its role does not grant the request.
    #[error("insufficient permissions")]
    Forbidden,

    /// A collaborator failed, including deadline expiry and rollback failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Token signing or password hashing failed internally.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
