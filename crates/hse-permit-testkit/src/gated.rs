//! A store wrapper that synchronizes readers.
//!
//! While armed, every `get_permit` and `get_permit_with_ledger` reads and
//! then waits at a shared barrier before returning. Arming it for two parties
//! makes two concurrent transitions hold the same revision, so exactly one of
//! them must lose the check-and-set.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use hse_permit_core::{
    Approval, ApprovalLedger, AuditEvent, DocumentRecord, Permit, PermitDraft, PermitId, UserId,
};
use hse_permit_store::{Result, Store, TransitionCommit};

/// See the module docs.
pub struct GatedStore<S: Store> {
    inner: S,
    gate: Mutex<Option<Arc<Barrier>>>,
}

impl<S: Store> GatedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Hold permit reads until `parties` of them have read.
    pub fn arm(&self, parties: usize) {
        if let Ok(mut gate) = self.gate.lock() {
            *gate = Some(Arc::new(Barrier::new(parties)));
        }
    }

    /// Let reads through again.
    pub fn disarm(&self) {
        if let Ok(mut gate) = self.gate.lock() {
            *gate = None;
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn barrier(&self) -> Option<Arc<Barrier>> {
        self.gate.lock().ok().and_then(|gate| gate.clone())
    }
}

#[async_trait]
impl<S: Store> Store for GatedStore<S> {
    async fn insert_permit(
        &self,
        id: PermitId,
        requester_id: UserId,
        draft: PermitDraft,
        now: i64,
    ) -> Result<Permit> {
        self.inner.insert_permit(id, requester_id, draft, now).await
    }

    async fn get_permit(&self, id: &PermitId) -> Result<Option<Permit>> {
        let permit = self.inner.get_permit(id).await?;
        if let Some(barrier) = self.barrier() {
            barrier.wait().await;
        }
        Ok(permit)
    }

    async fn get_permit_with_ledger(
        &self,
        id: &PermitId,
    ) -> Result<Option<(Permit, ApprovalLedger)>> {
        let snapshot = self.inner.get_permit_with_ledger(id).await?;
        if let Some(barrier) = self.barrier() {
            barrier.wait().await;
        }
        Ok(snapshot)
    }

    async fn update_permit_content(
        &self,
        permit: &Permit,
        expected_revision: u64,
        audit: &AuditEvent,
    ) -> Result<Permit> {
        self.inner
            .update_permit_content(permit, expected_revision, audit)
            .await
    }

    async fn soft_delete_permit(&self, id: &PermitId) -> Result<()> {
        self.inner.soft_delete_permit(id).await
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> Result<Permit> {
        self.inner.commit_transition(commit).await
    }

    async fn record_document(
        &self,
        id: &PermitId,
        record: &DocumentRecord,
        audit: &AuditEvent,
    ) -> Result<()> {
        self.inner.record_document(id, record, audit).await
    }

    async fn append_approval(&self, approval: &Approval) -> Result<()> {
        self.inner.append_approval(approval).await
    }

    async fn list_approvals(&self, permit_id: &PermitId) -> Result<ApprovalLedger> {
        self.inner.list_approvals(permit_id).await
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.inner.append_audit(event).await
    }

    async fn list_audit(&self, target_id: &PermitId) -> Result<Vec<AuditEvent>> {
        self.inner.list_audit(target_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_draft;
    use hse_permit_core::AuditAction;
    use hse_permit_store::MemoryStore;

    #[tokio::test]
    async fn test_disarmed_store_passes_through() {
        let store = GatedStore::new(MemoryStore::new());
        let permit = store
            .insert_permit(PermitId::new(), UserId::new(), sample_draft(), 0)
            .await
            .unwrap();
        assert!(store.get_permit(&permit.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_armed_readers_see_the_same_revision() {
        let store = GatedStore::new(MemoryStore::new());
        let permit = store
            .insert_permit(PermitId::new(), UserId::new(), sample_draft(), 0)
            .await
            .unwrap();

        // The writer only runs once the first reader is parked at the barrier.
        store.arm(2);
        let (read, write) = tokio::join!(store.get_permit(&permit.id), async {
            let mut edited = permit.clone();
            edited.title = "Modifié".into();
            let audit = AuditEvent::permit(
                AuditAction::ModificationPermis,
                permit.requester_id,
                permit.id,
                serde_json::json!({}),
                1,
            );
            let updated = store.update_permit_content(&edited, 0, &audit).await;
            (updated, store.get_permit(&permit.id).await)
        });
        store.disarm();

        assert_eq!(read.unwrap().unwrap().revision, 0);
        let (updated, second) = write;
        assert_eq!(updated.unwrap().revision, 1);
        assert_eq!(second.unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_armed_store_releases_together() {
        let store = GatedStore::new(MemoryStore::new());
        let permit = store
            .insert_permit(PermitId::new(), UserId::new(), sample_draft(), 0)
            .await
            .unwrap();

        store.arm(2);
        let (a, b) = tokio::join!(store.get_permit(&permit.id), store.get_permit(&permit.id));
        store.disarm();
        assert_eq!(a.unwrap(), b.unwrap());
    }
}
