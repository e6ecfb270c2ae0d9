//! Error types for the pantry-store crate.
//!
//! Every store operation returns [`StoreError`] via [`StoreResult`]. Two
//! severities reach the caller: [`StoreError::Invalid`] is a recoverable,
//! human-readable failure the web layer renders inline, while
//! [`StoreError::UnknownUser`] means the caller's session references an
//! account that no longer exists and the session must be terminated.
//! Backend failures are stringified so no `rusqlite` type crosses the
//! store boundary.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can leave the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Recoverable, user-facing failure: malformed input, a uniqueness
    /// collision, a credential or token mismatch, or a not-found item the
    /// caller could have avoided.
    #[error("{0}")]
    Invalid(String),

    /// The supplied owner id does not resolve to any existing account.
    /// The session that produced it is stale or corrupted.
    #[error("unknown user")]
    UnknownUser,

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    /// The database backend failed.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Build a recoverable error from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Whether the web layer should terminate the session instead of
    /// showing an inline message.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

// ── tests ────────────────────────────────────────────────────────────
