//! Error types for the store module.

use hse_permit_core::PermitId;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON column serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Permit absent or soft-deleted.
    #[error("permit not found: {0}")]
    NotFound(PermitId),

    /// Check-and-set lost: the permit moved since it was read.
    #[error("conflict on permit {permit_id}: expected revision {expected_revision}")]
    Conflict {
        permit_id: PermitId,
        expected_revision: u64,
    },

    /// An approval with this id is already in the ledger.
    #[error("duplicate approval: {0}")]
    DuplicateApproval(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Document path escapes the document root or is otherwise unusable.
    #[error("invalid document path: {0}")]
    InvalidPath(String),

    /// A lock guarding in-process state was poisoned.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Blocking task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Transient failures that a caller may retry once after re-reading.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Conflict { .. } | StoreError::Io(_) | StoreError::Task(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
