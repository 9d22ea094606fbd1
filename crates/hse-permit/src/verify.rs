//! Integrity verification of exported permits.
//!
//! Verification answers two questions about a permit that has been exported:
//!
//! - **Is the document intact?** The stored file must hash to the stored
//!   digest (`artifact_intact`), and a fresh render of the current permit and
//!   ledger, using the stored `generated_at`, must hash to it too
//!   (`content_current`). The second check catches edits made after export.
//! - **Are the signatures genuine?** Each approval's signature digest is
//!   re-derived from `(permit_id, actor_id, timestamp)` and the signing secret.
//!
//! Detected tampering is reported, never raised: the only errors are the
//! ones that prevent a check from running at all.

use std::sync::Arc;
use std::time::Duration;

use hse_permit_core::{
    derive_signature, now_millis, Approval, ApprovalId, DocumentDigest, PermitId, Role,
    SigningSecret, UserId,
};
use hse_permit_render::DocumentRenderer;
use hse_permit_store::{DocumentStore, Store};
use serde::Serialize;

use crate::error::{Result, WorkflowError};
use crate::export::render_bounded;

/// Why an approval's signature did not check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureFault {
    /// The approval carries no signature digest.
    Missing,
    /// The stored digest differs from the re-derived one.
    Mismatch,
}

impl SignatureFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureFault::Missing => "missing",
            SignatureFault::Mismatch => "mismatch",
        }
    }
}

/// Signature check of one approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalCheck {
    pub approval_id: ApprovalId,
    pub actor_id: UserId,
    pub approval_role: Role,
    pub timestamp: i64,
    pub valid: bool,
    pub reason: Option<SignatureFault>,
}

/// Full outcome of [`IntegrityVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub permit_id: PermitId,
    /// `document_intact && signatures_valid`.
    pub is_valid: bool,
    /// `artifact_intact && content_current`.
    pub document_intact: bool,
    /// The stored file hashes to the stored digest.
    pub artifact_intact: bool,
    /// A fresh render of the current data hashes to the stored digest.
    pub content_current: bool,
    /// Every approval's signature re-derives.
    pub signatures_valid: bool,
    /// Digest recorded at export.
    pub stored_digest: DocumentDigest,
    /// Digest of the file currently in document storage.
    pub artifact_digest: DocumentDigest,
    /// Digest of the fresh render.
    pub computed_digest: DocumentDigest,
    /// Oldest first.
    pub approvals: Vec<ApprovalCheck>,
    pub checked_at: i64,
}

impl VerificationReport {
    /// Checks that failed, for display.
    pub fn invalid_approvals(&self) -> impl Iterator<Item = &ApprovalCheck> {
        self.approvals.iter().filter(|c| !c.valid)
    }
}

/// Re-derive one approval's signature against `permit_id`.
pub fn check_approval(
    secret: &SigningSecret,
    permit_id: &PermitId,
    approval: &Approval,
) -> ApprovalCheck {
    let reason = match &approval.signature_digest {
        None => Some(SignatureFault::Missing),
        Some(stored) => {
            let expected = derive_signature(secret, permit_id, &approval.actor_id, approval.timestamp);
            (expected != *stored).then_some(SignatureFault::Mismatch)
        }
    };

    ApprovalCheck {
        approval_id: approval.id,
        actor_id: approval.actor_id,
        approval_role: approval.approval_role,
        timestamp: approval.timestamp,
        valid: reason.is_none(),
        reason,
    }
}

/// Read-only verifier over a store and a document store.
pub struct IntegrityVerifier<S: Store, D: DocumentStore> {
    store: Arc<S>,
    documents: Arc<D>,
    renderer: Arc<dyn DocumentRenderer>,
    secret: SigningSecret,
    render_timeout: Duration,
}

impl<S: Store, D: DocumentStore> IntegrityVerifier<S, D> {
    pub fn new(
        store: Arc<S>,
        documents: Arc<D>,
        renderer: Arc<dyn DocumentRenderer>,
        secret: SigningSecret,
        render_timeout: Duration,
    ) -> Self {
        Self {
            store,
            documents,
            renderer,
            secret,
            render_timeout,
        }
    }

    /// Verify an exported permit.
    ///
    /// Errors: `NotFound`, `NoDocument` before any export, `MissingArtifact`
    /// when the exported file is gone, `Timeout` if the re-render overruns.
    pub async fn verify(&self, permit_id: &PermitId) -> Result<VerificationReport> {
        let (permit, approvals) = self
            .store
            .get_permit_with_ledger(permit_id)
            .await?
            .ok_or(WorkflowError::NotFound(*permit_id))?;
        let record = permit
            .document
            .clone()
            .ok_or(WorkflowError::NoDocument(*permit_id))?;

        let stored_bytes = self.documents.read(&record.path).await?.ok_or_else(|| {
            WorkflowError::MissingArtifact {
                permit_id: *permit_id,
                path: record.path.clone(),
            }
        })?;

        let artifact_digest = DocumentDigest::compute(&stored_bytes);
        let artifact_intact = artifact_digest == record.digest;

        let checks: Vec<ApprovalCheck> = approvals
            .iter()
            .map(|a| check_approval(&self.secret, permit_id, a))
            .collect();
        let signatures_valid = checks.iter().all(|c| c.valid);

        let rendered = render_bounded(
            Arc::clone(&self.renderer),
            permit,
            approvals,
            record.generated_at,
            self.render_timeout,
        )
        .await?;
        let computed_digest = DocumentDigest::compute(&rendered);
        let content_current = computed_digest == record.digest;

        let document_intact = artifact_intact && content_current;
        let report = VerificationReport {
            permit_id: *permit_id,
            is_valid: document_intact && signatures_valid,
            document_intact,
            artifact_intact,
            content_current,
            signatures_valid,
            stored_digest: record.digest,
            artifact_digest,
            computed_digest,
            approvals: checks,
            checked_at: now_millis(),
        };

        if report.is_valid {
            tracing::info!(permit_id = %permit_id, "permit verified");
        } else {
            tracing::warn!(
                permit_id = %permit_id,
                artifact_intact,
                content_current,
                invalid_signatures = report.invalid_approvals().count(),
                "permit integrity check failed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hse_permit_core::{Decision, SignatureDigest};

    fn approval(secret: &SigningSecret, permit_id: PermitId) -> Approval {
        let actor_id = UserId::new();
        let timestamp = 1_780_000_000_000;
        Approval {
            id: ApprovalId::new(),
            permit_id,
            actor_id,
            approval_role: Role::Superviseur,
            decision: Decision::Approve,
            comment: None,
            signature_image: None,
            signature_digest: Some(derive_signature(secret, &permit_id, &actor_id, timestamp)),
            timestamp,
        }
    }

    #[test]
    fn test_check_approval_outcomes() {
        let secret = SigningSecret::new("secret").unwrap();
        let permit_id = PermitId::new();
        let good = approval(&secret, permit_id);

        let check = check_approval(&secret, &permit_id, &good);
        assert!(check.valid);
        assert_eq!(check.reason, None);

        let mut missing = good.clone();
        missing.signature_digest = None;
        assert_eq!(
            check_approval(&secret, &permit_id, &missing).reason,
            Some(SignatureFault::Missing)
        );

        let mut forged = good.clone();
        forged.signature_digest = Some(SignatureDigest::from_bytes([0; 32]));
        assert_eq!(
            check_approval(&secret, &permit_id, &forged).reason,
            Some(SignatureFault::Mismatch)
        );

        let mut moved = good.clone();
        moved.timestamp += 1;
        assert!(!check_approval(&secret, &permit_id, &moved).valid);

        // Signed under another permit.
        assert!(!check_approval(&secret, &PermitId::new(), &good).valid);

        // Rotated secret.
        let rotated = SigningSecret::new("rotated").unwrap();
        assert!(!check_approval(&rotated, &permit_id, &good).valid);
    }

    #[test]
    fn test_fault_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SignatureFault::Mismatch).unwrap(),
            "\"mismatch\""
        );
        assert_eq!(SignatureFault::Missing.as_str(), "missing");
    }
}
