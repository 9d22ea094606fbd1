//! Error types for the permit workflow.

use hse_permit_core::{PermitId, ValidationError};
use hse_permit_perms::Denial;
use hse_permit_render::RenderError;
use hse_permit_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`PermitService`](crate::PermitService).
///
/// A failed integrity check is not an error; it is a
/// [`VerificationReport`](crate::VerificationReport) with `is_valid = false`.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Permit absent or soft-deleted.
    #[error("permit not found: {0}")]
    NotFound(PermitId),

    /// The actor may not perform this transition in the current status.
    #[error("unauthorized: {0}")]
    Unauthorized(Denial),

    /// The actor may not edit this permit.
    #[error("forbidden: {0}")]
    Forbidden(Denial),

    /// The permit changed between read and write. Re-read and retry.
    #[error("permit {0} was modified concurrently")]
    Conflict(PermitId),

    /// The export was recorded but its file is gone.
    #[error("exported document for permit {permit_id} is missing at {path}")]
    MissingArtifact { permit_id: PermitId, path: String },

    /// Verification requested before any export.
    #[error("permit {0} has no exported document")]
    NoDocument(PermitId),

    /// Rendering exceeded the configured bound.
    #[error("document rendering timed out after {0} ms")]
    Timeout(u64),

    /// Permit content failed validation.
    #[error("invalid permit: {0}")]
    Invalid(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Render error.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Whether the caller may retry once after re-reading the permit.
    ///
    /// Business refusals are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Conflict(_) | WorkflowError::Timeout(_) => true,
            WorkflowError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::Conflict { permit_id, .. } => WorkflowError::Conflict(permit_id),
            other => WorkflowError::Store(other),
        }
    }
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
