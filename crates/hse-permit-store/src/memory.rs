//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use hse_permit_core::{
    Approval, ApprovalId, ApprovalLedger, AuditEvent, DocumentRecord, Permit, PermitDraft,
    PermitId, PermitNumber, UserId,
};

use crate::error::{Result, StoreError};
use crate::traits::{Store, TransitionCommit};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// write holds the lock for its whole check-and-set.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    permits: HashMap<PermitId, Permit>,

    /// Ledger per permit, in insertion order.
    approvals: HashMap<PermitId, Vec<Approval>>,

    approval_ids: HashSet<ApprovalId>,

    audit: Vec<AuditEvent>,

    /// Last issued sequence per calendar year.
    sequences: HashMap<i32, u32>,
}

impl MemoryStoreInner {
    fn live_permit(&self, id: &PermitId) -> Result<&Permit> {
        self.permits
            .get(id)
            .filter(|p| !p.deleted)
            .ok_or(StoreError::NotFound(*id))
    }

    fn ledger(&self, permit_id: &PermitId) -> ApprovalLedger {
        ApprovalLedger::new(self.approvals.get(permit_id).cloned().unwrap_or_default())
    }

    fn push_approval(&mut self, approval: &Approval) -> Result<()> {
        // Deleted permits still own their ledger rows.
        if !self.permits.contains_key(&approval.permit_id) {
            return Err(StoreError::NotFound(approval.permit_id));
        }
        if !self.approval_ids.insert(approval.id) {
            return Err(StoreError::DuplicateApproval(approval.id.to_string()));
        }
        self.approvals
            .entry(approval.permit_id)
            .or_default()
            .push(approval.clone());
        Ok(())
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_permit(
        &self,
        id: PermitId,
        requester_id: UserId,
        draft: PermitDraft,
        now: i64,
    ) -> Result<Permit> {
        let mut inner = self.write()?;

        if inner.permits.contains_key(&id) {
            return Err(StoreError::InvalidData(format!("permit {id} already exists")));
        }

        let year = PermitNumber::year_of(now);
        let seq = inner.sequences.entry(year).or_insert(0);
        *seq += 1;
        let number = PermitNumber::new(year, *seq);

        let permit = Permit::from_draft(id, number, requester_id, draft, now);
        inner.permits.insert(id, permit.clone());
        Ok(permit)
    }

    async fn get_permit(&self, id: &PermitId) -> Result<Option<Permit>> {
        let inner = self.read()?;
        Ok(inner.permits.get(id).filter(|p| !p.deleted).cloned())
    }

    async fn get_permit_with_ledger(
        &self,
        id: &PermitId,
    ) -> Result<Option<(Permit, ApprovalLedger)>> {
        let inner = self.read()?;
        Ok(inner
            .permits
            .get(id)
            .filter(|p| !p.deleted)
            .map(|p| (p.clone(), inner.ledger(id))))
    }

    async fn update_permit_content(
        &self,
        permit: &Permit,
        expected_revision: u64,
        audit: &AuditEvent,
    ) -> Result<Permit> {
        let mut inner = self.write()?;

        let current = inner.live_permit(&permit.id)?;
        if current.revision != expected_revision {
            return Err(StoreError::Conflict {
                permit_id: permit.id,
                expected_revision,
            });
        }

        // Only content fields come from the caller.
        let mut updated = current.clone();
        updated.permit_type_id = permit.permit_type_id;
        updated.zone_id = permit.zone_id;
        updated.starts_at = permit.starts_at;
        updated.ends_at = permit.ends_at;
        updated.title = permit.title.clone();
        updated.description = permit.description.clone();
        updated.preconditions = permit.preconditions.clone();
        updated.prevention_measures = permit.prevention_measures.clone();
        updated.atmospheric_tests = permit.atmospheric_tests.clone();
        updated.attachments = permit.attachments.clone();
        updated.revision += 1;
        updated.updated_at = audit.at;

        inner.permits.insert(permit.id, updated.clone());
        inner.audit.push(audit.clone());
        Ok(updated)
    }

    async fn soft_delete_permit(&self, id: &PermitId) -> Result<()> {
        let mut inner = self.write()?;
        inner.live_permit(id)?;
        if let Some(p) = inner.permits.get_mut(id) {
            p.deleted = true;
        }
        Ok(())
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<Permit> {
        let mut inner = self.write()?;

        let current = inner.live_permit(&commit.permit_id)?;
        if current.status != commit.expected_status || current.revision != commit.expected_revision
        {
            return Err(StoreError::Conflict {
                permit_id: commit.permit_id,
                expected_revision: commit.expected_revision,
            });
        }

        let mut updated = current.clone();
        updated.status = commit.next_status;
        updated.revision += 1;
        updated.updated_at = commit.at;

        // All checks pass before anything is written.
        if let Some(approval) = &commit.approval {
            if inner.approval_ids.contains(&approval.id) {
                return Err(StoreError::DuplicateApproval(approval.id.to_string()));
            }
            inner.push_approval(approval)?;
        }
        inner.permits.insert(commit.permit_id, updated.clone());
        inner.audit.push(commit.audit.clone());

        Ok(updated)
    }

    async fn record_document(
        &self,
        id: &PermitId,
        record: &DocumentRecord,
        audit: &AuditEvent,
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner.live_permit(id)?;
        if let Some(p) = inner.permits.get_mut(id) {
            p.document = Some(record.clone());
        }
        inner.audit.push(audit.clone());
        Ok(())
    }

    async fn append_approval(&self, approval: &Approval) -> Result<()> {
        let mut inner = self.write()?;
        inner.push_approval(approval)
    }

    async fn list_approvals(&self, permit_id: &PermitId) -> Result<ApprovalLedger> {
        let inner = self.read()?;
        Ok(inner.ledger(permit_id))
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        let mut inner = self.write()?;
        inner.audit.push(event.clone());
        Ok(())
    }

    async fn list_audit(&self, target_id: &PermitId) -> Result<Vec<AuditEvent>> {
        let inner = self.read()?;
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.target_id == *target_id)
            .cloned()
            .collect())
    }
}
