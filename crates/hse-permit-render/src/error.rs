//! Error types for document rendering.

use thiserror::Error;

/// Errors that can occur while producing document bytes.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The PDF writer failed.
    #[error("pdf error: {0}")]
    Pdf(String),

    /// Text could not be laid out on the page.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<lopdf::Error> for RenderError {
    fn from(e: lopdf::Error) -> Self {
        RenderError::Pdf(e.to_string())
    }
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;
