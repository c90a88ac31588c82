//! Store Errors
//!
//! Error types shared by the ledger, idempotency and wallet stores.

use uuid::Uuid;

/// Errors that can occur in a persistence adapter
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict on a versioned record
    #[error("Version conflict for {id}: expected version {expected}, found {actual}")]
    VersionConflict { id: Uuid, expected: i64, actual: i64 },

    /// Unique constraint hit outside an insert-if-absent path
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Transient failure (pool exhausted, connection dropped, injected fault)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be mapped back to a domain value
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Maximum retries exceeded
    #[error("Maximum retries exceeded for {0}")]
    MaxRetriesExceeded(&'static str),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// Check if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
            ) || is_serialization_failure(e),
            _ => false,
        }
    }
}

/// Postgres unique violation (23505)
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Postgres serialization failure (40001) or deadlock (40P01)
fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
    )
}
