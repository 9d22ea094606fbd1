//! Bounded rendering and the exported-document type.

use std::sync::Arc;
use std::time::Duration;

use hse_permit_core::{ApprovalLedger, DocumentDigest, Permit, PermitNumber};
use hse_permit_render::{DocumentRenderer, RenderError};

use crate::error::{Result, WorkflowError};

/// A rendered permit as written to document storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub bytes: Vec<u8>,
    pub digest: DocumentDigest,
    /// Relative path inside the document store.
    pub path: String,
    /// The `generated_at` printed on the document and stored with the digest.
    pub generated_at: i64,
}

/// `<prefix>/<number>.pdf`
pub fn document_path(prefix: &str, number: &PermitNumber) -> String {
    format!("{}/{}.pdf", prefix.trim_end_matches('/'), number)
}

/// Render on the blocking pool, giving up after `timeout`.
///
/// On timeout the render keeps running in the background and its output is
/// dropped; nothing is persisted.
pub(crate) async fn render_bounded(
    renderer: Arc<dyn DocumentRenderer>,
    permit: Permit,
    approvals: ApprovalLedger,
    generated_at: i64,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let task =
        tokio::task::spawn_blocking(move || renderer.render(&permit, &approvals, generated_at));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(rendered)) => Ok(rendered?),
        Ok(Err(join)) => Err(WorkflowError::Render(RenderError::Pdf(format!(
            "render task failed: {join}"
        )))),
        Err(_) => Err(WorkflowError::Timeout(timeout.as_millis() as u64)),
    }
}
