//! Approval records and the ordered ledger view.

use serde::{Deserialize, Serialize};

use crate::crypto::SignatureDigest;
use crate::types::{ApprovalId, Decision, PermitId, Role, UserId};

/// One sign-off on a permit. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub permit_id: PermitId,
    pub actor_id: UserId,
    /// The workflow slot this action satisfied; differs from the actor's
    /// account role only for `HSE`.
    pub approval_role: Role,
    pub decision: Decision,
    pub comment: Option<String>,
    /// Reference to a scanned handwritten signature, if one was supplied.
    pub signature_image: Option<String>,
    /// `None` only for rows that were written without one.
    pub signature_digest: Option<SignatureDigest>,
    /// Unix ms, as persisted. Signature derivation uses this exact value.
    pub timestamp: i64,
}

/// The approvals of one permit in canonical order (timestamp ascending).
///
/// Finite and restartable: iterate with [`iter`](Self::iter) as many times as
/// needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalLedger(Vec<Approval>);

impl ApprovalLedger {
    /// Build a ledger, sorting by timestamp. The sort is stable so insertion
    /// order breaks ties.
    pub fn new(mut approvals: Vec<Approval>) -> Self {
        approvals.sort_by_key(|a| a.timestamp);
        Self(approvals)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Approval> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Approval] {
        &self.0
    }

    pub fn last(&self) -> Option<&Approval> {
        self.0.last()
    }

    /// Whether this ledger is a prefix of `later`.
    pub fn is_prefix_of(&self, later: &ApprovalLedger) -> bool {
        later.0.len() >= self.0.len() && later.0[..self.0.len()] == self.0[..]
    }

    pub fn into_vec(self) -> Vec<Approval> {
        self.0
    }
}

impl IntoIterator for ApprovalLedger {
    type Item = Approval;
    type IntoIter = std::vec::IntoIter<Approval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ApprovalLedger {
    type Item = &'a Approval;
    type IntoIter = std::slice::Iter<'a, Approval>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
