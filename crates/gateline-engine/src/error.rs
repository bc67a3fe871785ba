//! Engine error taxonomy.
//!
//! `RateLimited` and `InvalidToken` are expected, user-facing outcomes of
//! the claim flow, not system failures; callers surface them distinctly so
//! clients back off or re-claim instead of retrying blindly.

use std::time::Duration;

use gateline_core::db::DatabaseError;

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad capacity/time configuration, rejected at write time.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Claim throttled; recoverable after `retry_after`.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Claim token missing, expired, or already consumed.
    #[error("Invalid claim token")]
    InvalidToken,

    /// Registration/token/quota/event absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying storage failure.
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for EngineError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            DatabaseError::Constraint(what) => Self::Validation(what),
            other => Self::Database(other),
        }
    }
}
