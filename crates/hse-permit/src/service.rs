//! The permit service: unified API for the permit workflow.
//!
//! Every status change goes through one commit path: read the permit, ask
//! the state machine, then hand a [`TransitionCommit`] to the store, which
//! applies it only if the permit is still at the revision that was read.

use std::sync::Arc;

use hse_permit_core::{
    derive_signature, now_millis, validate_draft, validate_permit, Approval, ApprovalId,
    ApprovalLedger, AuditAction, AuditEvent, Decision, DocumentDigest, DocumentRecord, Permit,
    PermitDraft, PermitId, PermitPatch, PermitStatus,
};
use hse_permit_perms::{
    authorize_close, authorize_edit, authorize_submit, authorize_suspend, decide, Actor,
};
use hse_permit_render::{DocumentRenderer, PdfRenderer};
use hse_permit_store::{DocumentStore, Store, TransitionCommit};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, WorkflowError};
use crate::export::{document_path, render_bounded, ExportedDocument};
use crate::verify::{IntegrityVerifier, VerificationReport};

/// A permit together with its approval ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PermitView {
    pub permit: Permit,
    pub approvals: ApprovalLedger,
}

/// The permit workflow.
///
/// Provides:
/// - Creating, editing and reading permits
/// - Submission, approval, suspension and closure
/// - PDF export and integrity verification
///
/// Refusals are never retried here. A [`WorkflowError::Conflict`] tells the
/// caller to re-read and decide again.
pub struct PermitService<S: Store, D: DocumentStore> {
    store: Arc<S>,
    documents: Arc<D>,
    renderer: Arc<dyn DocumentRenderer>,
    config: ServiceConfig,
    verifier: IntegrityVerifier<S, D>,
}

impl<S: Store, D: DocumentStore> PermitService<S, D> {
    /// Create a service rendering with [`PdfRenderer`].
    pub fn new(store: S, documents: D, config: ServiceConfig) -> Self {
        let renderer = Arc::new(PdfRenderer::new(config.signature_display_len));
        Self::with_renderer(store, documents, renderer, config)
    }

    /// Create a service with a custom renderer.
    pub fn with_renderer(
        store: S,
        documents: D,
        renderer: Arc<dyn DocumentRenderer>,
        config: ServiceConfig,
    ) -> Self {
        let store = Arc::new(store);
        let documents = Arc::new(documents);
        let verifier = IntegrityVerifier::new(
            Arc::clone(&store),
            Arc::clone(&documents),
            Arc::clone(&renderer),
            config.signing_secret.clone(),
            config.render_timeout(),
        );
        Self {
            store,
            documents,
            renderer,
            config,
            verifier,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the document store reference.
    pub fn documents(&self) -> &D {
        &self.documents
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn verifier(&self) -> &IntegrityVerifier<S, D> {
        &self.verifier
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permit Content
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a permit in `BROUILLON` with `actor` as requester.
    pub async fn create_permit(&self, actor: &Actor, draft: PermitDraft) -> Result<Permit> {
        validate_draft(&draft)?;

        let now = now_millis();
        let permit = self
            .store
            .insert_permit(PermitId::new(), actor.id, draft, now)
            .await?;

        let audit = AuditEvent::permit(
            AuditAction::CreationPermis,
            actor.id,
            permit.id,
            json!({ "numero": permit.number.to_string(), "titre": permit.title }),
            now,
        );
        self.store.append_audit(&audit).await?;

        info!(permit_id = %permit.id, number = %permit.number, "permit created");
        Ok(permit)
    }

    /// Edit content fields. Status and export facts are left alone.
    pub async fn update_permit(
        &self,
        permit_id: &PermitId,
        actor: &Actor,
        patch: PermitPatch,
    ) -> Result<Permit> {
        let permit = self.load(permit_id).await?;
        if let Err(denial) = authorize_edit(&permit, actor) {
            warn!(permit_id = %permit_id, role = %actor.role, %denial, "edit refused");
            return Err(WorkflowError::Forbidden(denial));
        }
        if patch.is_empty() {
            return Ok(permit);
        }

        let expected_revision = permit.revision;
        let fields = patch.touched_fields();
        let mut edited = permit;
        edited.apply_patch(patch);
        validate_permit(&edited)?;

        let audit = AuditEvent::permit(
            AuditAction::ModificationPermis,
            actor.id,
            *permit_id,
            json!({ "champs": fields }),
            now_millis(),
        );
        let updated = self
            .store
            .update_permit_content(&edited, expected_revision, &audit)
            .await?;

        info!(permit_id = %permit_id, revision = updated.revision, "permit updated");
        Ok(updated)
    }

    /// A permit with its ledger.
    pub async fn get_permit(&self, permit_id: &PermitId) -> Result<PermitView> {
        let (permit, approvals) = self.load_with_ledger(permit_id).await?;
        Ok(PermitView { permit, approvals })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Move a draft into the approval chain.
    pub async fn submit(&self, permit_id: &PermitId, actor: &Actor) -> Result<PermitView> {
        let permit = self.load(permit_id).await?;
        let next = authorize_submit(&permit, actor).map_err(|denial| {
            warn!(permit_id = %permit_id, role = %actor.role, %denial, "submission refused");
            WorkflowError::Unauthorized(denial)
        })?;

        let payload = json!({
            "ancien_statut": permit.status,
            "nouveau_statut": next,
        });
        self.commit(&permit, actor, next, None, AuditAction::SoumissionPermis, payload, now_millis())
            .await
    }

    /// Record an approval by `actor` and advance the permit.
    ///
    /// The approval's timestamp is sampled once and used both for the stored
    /// row and for its signature digest.
    pub async fn attempt_approval(
        &self,
        permit_id: &PermitId,
        actor: &Actor,
        comment: Option<String>,
        signature_image: Option<String>,
    ) -> Result<PermitView> {
        let permit = self.load(permit_id).await?;
        let transition = decide(permit.status, actor.role).map_err(|denial| {
            warn!(permit_id = %permit_id, role = %actor.role, %denial, "approval refused");
            WorkflowError::Unauthorized(denial)
        })?;

        let timestamp = now_millis();
        let signature = derive_signature(&self.config.signing_secret, permit_id, &actor.id, timestamp);
        let approval = Approval {
            id: ApprovalId::new(),
            permit_id: *permit_id,
            actor_id: actor.id,
            approval_role: transition.approval_role,
            decision: Decision::Approve,
            comment,
            signature_image,
            signature_digest: Some(signature),
            timestamp,
        };

        let payload = json!({
            "role": transition.approval_role,
            "nouveau_statut": transition.next_status,
        });
        self.commit(
            &permit,
            actor,
            transition.next_status,
            Some(approval),
            AuditAction::ValidationPermis,
            payload,
            timestamp,
        )
        .await
    }

    /// Suspend an active permit. No ledger entry is written.
    pub async fn suspend(
        &self,
        permit_id: &PermitId,
        actor: &Actor,
        reason: &str,
    ) -> Result<PermitView> {
        let permit = self.load(permit_id).await?;
        let next = authorize_suspend(permit.status, actor.role).map_err(|denial| {
            warn!(permit_id = %permit_id, role = %actor.role, %denial, "suspension refused");
            WorkflowError::Unauthorized(denial)
        })?;

        let payload = json!({
            "motif": reason,
            "ancien_statut": permit.status,
        });
        self.commit(&permit, actor, next, None, AuditAction::SuspensionPermis, payload, now_millis())
            .await
    }

    /// Close a permit outside the approval table. No ledger entry is written.
    ///
    /// Allowed to `HSE`, `SUPERVISEUR` and the requester from any status but
    /// `CLOTURE`, so a permit can be closed without an `HSE` approval.
    pub async fn close(&self, permit_id: &PermitId, actor: &Actor) -> Result<PermitView> {
        let permit = self.load(permit_id).await?;
        let next = authorize_close(&permit, actor).map_err(|denial| {
            warn!(permit_id = %permit_id, role = %actor.role, %denial, "closure refused");
            WorkflowError::Unauthorized(denial)
        })?;

        let payload = json!({ "ancien_statut": permit.status });
        self.commit(&permit, actor, next, None, AuditAction::CloturePermis, payload, now_millis())
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────

    /// Render the permit, store the PDF and record its digest.
    ///
    /// Re-exporting replaces the stored document and digest.
    pub async fn export_document(
        &self,
        permit_id: &PermitId,
        actor: &Actor,
    ) -> Result<ExportedDocument> {
        let (permit, approvals) = self.load_with_ledger(permit_id).await?;

        let generated_at = now_millis();
        let path = document_path(&self.config.document_prefix, &permit.number);
        let approval_count = approvals.len();
        let bytes = render_bounded(
            Arc::clone(&self.renderer),
            permit,
            approvals,
            generated_at,
            self.config.render_timeout(),
        )
        .await
        .map_err(|e| {
            warn!(permit_id = %permit_id, error = %e, "render failed");
            e
        })?;
        let digest = DocumentDigest::compute(&bytes);

        self.documents.persist(&path, &bytes).await?;

        let record = DocumentRecord {
            digest,
            path: path.clone(),
            generated_at,
        };
        let audit = AuditEvent::permit(
            AuditAction::ExportPermis,
            actor.id,
            *permit_id,
            json!({
                "chemin": path,
                "empreinte": digest.to_hex(),
                "validations": approval_count,
            }),
            generated_at,
        );
        self.store.record_document(permit_id, &record, &audit).await?;

        info!(permit_id = %permit_id, %path, digest = %digest.short(16), "permit exported");
        Ok(ExportedDocument {
            bytes,
            digest,
            path,
            generated_at,
        })
    }

    /// Verify the exported document and every approval signature.
    pub async fn verify(&self, permit_id: &PermitId) -> Result<VerificationReport> {
        self.verifier.verify(permit_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn load(&self, permit_id: &PermitId) -> Result<Permit> {
        self.store
            .get_permit(permit_id)
            .await?
            .ok_or(WorkflowError::NotFound(*permit_id))
    }

    async fn load_with_ledger(&self, permit_id: &PermitId) -> Result<(Permit, ApprovalLedger)> {
        self.store
            .get_permit_with_ledger(permit_id)
            .await?
            .ok_or(WorkflowError::NotFound(*permit_id))
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        permit: &Permit,
        actor: &Actor,
        next_status: PermitStatus,
        approval: Option<Approval>,
        action: AuditAction,
        payload: serde_json::Value,
        at: i64,
    ) -> Result<PermitView> {
        let commit = TransitionCommit {
            permit_id: permit.id,
            expected_status: permit.status,
            expected_revision: permit.revision,
            next_status,
            approval,
            audit: AuditEvent::permit(action, actor.id, permit.id, payload, at),
            at,
        };

        let updated = match self.store.commit_transition(&commit).await {
            Ok(p) => p,
            Err(e) => {
                let e = WorkflowError::from(e);
                if matches!(e, WorkflowError::Conflict(_)) {
                    warn!(permit_id = %permit.id, action = action.as_str(), "transition lost a race");
                }
                return Err(e);
            }
        };
        debug!(permit_id = %permit.id, revision = updated.revision, "transition committed");
        info!(
            permit_id = %permit.id,
            action = action.as_str(),
            from = %permit.status,
            to = %updated.status,
            role = %actor.role,
            "permit transition"
        );

        let approvals = self.store.list_approvals(&permit.id).await?;
        Ok(PermitView {
            permit: updated,
            approvals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hse_permit_core::{FieldMap, PermitTypeId, Role, SigningSecret, UserId, ZoneId};
    use hse_permit_store::{MemoryDocumentStore, MemoryStore};

    fn service() -> PermitService<MemoryStore, MemoryDocumentStore> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let secret = SigningSecret::new("unit-test-secret").unwrap();
        PermitService::new(
            MemoryStore::new(),
            MemoryDocumentStore::new(),
            ServiceConfig::new(secret),
        )
    }

    fn draft() -> PermitDraft {
        let now = now_millis();
        PermitDraft {
            permit_type_id: PermitTypeId::new(),
            zone_id: ZoneId::new(),
            starts_at: now,
            ends_at: now + 3_600_000,
            title: "Soudure atelier B".into(),
            description: String::new(),
            preconditions: FieldMap::new(),
            prevention_measures: FieldMap::new(),
            atmospheric_tests: FieldMap::new(),
            attachments: FieldMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_writes_audit() {
        let svc = service();
        let requester = Actor::new(UserId::new(), Role::Demandeur);
        let permit = svc.create_permit(&requester, draft()).await.unwrap();

        assert_eq!(permit.status, PermitStatus::Brouillon);
        assert_eq!(permit.requester_id, requester.id);
        let audit = svc.store().list_audit(&permit.id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::CreationPermis);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_draft() {
        let svc = service();
        let requester = Actor::new(UserId::new(), Role::Demandeur);
        let mut bad = draft();
        bad.ends_at = bad.starts_at;
        assert!(matches!(
            svc.create_permit(&requester, bad).await,
            Err(WorkflowError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_approval_signature_uses_stored_timestamp() {
        let svc = service();
        let requester = Actor::new(UserId::new(), Role::Demandeur);
        let supervisor = Actor::new(UserId::new(), Role::Superviseur);
        let permit = svc.create_permit(&requester, draft()).await.unwrap();
        svc.submit(&permit.id, &requester).await.unwrap();

        let view = svc
            .attempt_approval(&permit.id, &supervisor, Some("ok".into()), None)
            .await
            .unwrap();
        assert_eq!(view.permit.status, PermitStatus::Valide);

        let approval = view.approvals.last().unwrap();
        assert_eq!(approval.approval_role, Role::Superviseur);
        assert_eq!(
            approval.signature_digest,
            Some(derive_signature(
                &svc.config().signing_secret,
                &permit.id,
                &supervisor.id,
                approval.timestamp
            ))
        );
    }

    #[tokio::test]
    async fn test_edit_does_not_touch_status() {
        let svc = service();
        let requester = Actor::new(UserId::new(), Role::Demandeur);
        let permit = svc.create_permit(&requester, draft()).await.unwrap();

        let updated = svc
            .update_permit(
                &permit.id,
                &requester,
                PermitPatch {
                    title: Some("Soudure atelier C".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Soudure atelier C");
        assert_eq!(updated.status, PermitStatus::Brouillon);
        assert_eq!(updated.revision, permit.revision + 1);

        let audit = svc.store().list_audit(&permit.id).await.unwrap();
        assert_eq!(audit[1].action, AuditAction::ModificationPermis);
        assert_eq!(audit[1].payload, json!({ "champs": ["title"] }));
    }

    #[tokio::test]
    async fn test_unknown_permit_is_not_found() {
        let svc = service();
        let hse = Actor::new(UserId::new(), Role::Hse);
        let id = PermitId::new();
        assert!(matches!(svc.get_permit(&id).await, Err(WorkflowError::NotFound(_))));
        assert!(matches!(
            svc.attempt_approval(&id, &hse, None, None).await,
            Err(WorkflowError::NotFound(_))
        ));
        assert!(matches!(svc.verify(&id).await, Err(WorkflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_export_on_disk_and_verify() {
        use hse_permit_store::{FsDocumentStore, SqliteStore};

        let dir = tempfile::tempdir().unwrap();
        let svc = PermitService::new(
            SqliteStore::open(dir.path().join("permits.db")).unwrap(),
            FsDocumentStore::new(dir.path().join("documents")),
            ServiceConfig::new(SigningSecret::new("unit-test-secret").unwrap()),
        );
        let requester = Actor::new(UserId::new(), Role::Demandeur);
        let permit = svc.create_permit(&requester, draft()).await.unwrap();

        let exported = svc.export_document(&permit.id, &requester).await.unwrap();
        let on_disk = std::fs::read(dir.path().join("documents").join(&exported.path)).unwrap();
        assert_eq!(on_disk, exported.bytes);

        let report = svc.verify(&permit.id).await.unwrap();
        assert!(report.is_valid);
        assert!(report.approvals.is_empty());
    }
}
