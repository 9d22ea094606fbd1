//! Error types for the HSE Permit Core.

use thiserror::Error;

/// Structural errors in permit data or in encoded values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("permit window is empty: ends_at {ends_at} is not after starts_at {starts_at}")]
    InvalidWindow { starts_at: i64, ends_at: i64 },

    #[error("field map {map} contains an empty key")]
    EmptyFieldKey { map: &'static str },

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("unknown decision: {0}")]
    UnknownDecision(String),

    #[error("unknown audit action: {0}")]
    UnknownAuditAction(String),

    #[error("malformed digest: {0}")]
    MalformedDigest(String),

    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("signing secret not available: {0}")]
    MissingSecret(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, ValidationError>;
