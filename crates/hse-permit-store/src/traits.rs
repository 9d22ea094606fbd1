//! Store trait: the abstract interface for permit persistence.
//!
//! This trait keeps the workflow storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use hse_permit_core::{
    Approval, ApprovalLedger, AuditEvent, DocumentRecord, Permit, PermitDraft, PermitId,
    PermitStatus, UserId,
};

use crate::error::Result;

/// One status change of a permit, applied atomically.
///
/// The store checks that the permit is still at `(expected_status,
/// expected_revision)`, appends `approval` if present, sets `next_status`,
/// bumps the revision and records `audit`. On a mismatch nothing is written
/// and [`StoreError::Conflict`](crate::StoreError::Conflict) is returned.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub permit_id: PermitId,
    pub expected_status: PermitStatus,
    pub expected_revision: u64,
    pub next_status: PermitStatus,
    pub approval: Option<Approval>,
    pub audit: AuditEvent,
    /// Becomes the permit's `updated_at`.
    pub at: i64,
}

/// The Store trait: async interface for permit persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, blocking work runs on `spawn_blocking`.
///
/// Soft-deleted permits are invisible to every read and write.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Permit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new `BROUILLON` permit, assigning the next sequence number of
    /// the calendar year of `now`.
    async fn insert_permit(
        &self,
        id: PermitId,
        requester_id: UserId,
        draft: PermitDraft,
        now: i64,
    ) -> Result<Permit>;

    /// Get a permit by id. Soft-deleted permits are reported as absent.
    async fn get_permit(&self, id: &PermitId) -> Result<Option<Permit>>;

    /// A permit and its ledger read from one snapshot, so no transition can
    /// land between the two.
    async fn get_permit_with_ledger(
        &self,
        id: &PermitId,
    ) -> Result<Option<(Permit, ApprovalLedger)>>;

    /// Write the content fields of `permit` if its stored revision is still
    /// `expected_revision`. Status, export facts and `deleted` are never
    /// written by this call.
    async fn update_permit_content(
        &self,
        permit: &Permit,
        expected_revision: u64,
        audit: &AuditEvent,
    ) -> Result<Permit>;

    /// Mark a permit as deleted. It stays in storage.
    async fn soft_delete_permit(&self, id: &PermitId) -> Result<()>;

    /// Apply a status transition atomically. See [`TransitionCommit`].
    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<Permit>;

    /// Record the export facts of a permit and its audit event.
    async fn record_document(
        &self,
        id: &PermitId,
        record: &DocumentRecord,
        audit: &AuditEvent,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Approval Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an approval. Fails only on storage errors; business rules are
    /// checked before this is called.
    async fn append_approval(&self, approval: &Approval) -> Result<()>;

    /// All approvals of a permit, timestamp ascending.
    async fn list_approvals(&self, permit_id: &PermitId) -> Result<ApprovalLedger>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Log
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an audit event outside of a transition.
    async fn append_audit(&self, event: &AuditEvent) -> Result<()>;

    /// Audit events of a permit, in emission order.
    async fn list_audit(&self, target_id: &PermitId) -> Result<Vec<AuditEvent>>;
}
