//! # HSE Permit Render
//!
//! Canonical rendering of a permit and its approval ledger to PDF bytes.
//!
//! Rendering is a pure function of `(permit, ledger, generated_at)`: the
//! integrity verifier re-renders the current data and compares digests, so
//! any difference in output must come from a difference in the data.
//!
//! ## Key Types
//!
//! - [`DocumentRenderer`] - The rendering seam used by the workflow
//! - [`PdfRenderer`] - lopdf-based implementation (A4, Courier, paginated)
//! - [`DocumentLayout`] - The ordered text lines that end up on the pages

pub mod error;
pub mod layout;
pub mod pdf;

pub use error::{RenderError, Result};
pub use layout::{escape_text, format_timestamp, DocumentLayout, LINE_WIDTH};
pub use pdf::{DocumentRenderer, PdfRenderer, LINES_PER_PAGE};
