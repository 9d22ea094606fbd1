//! The approval table and side-transition rules.

use serde::{Deserialize, Serialize};

use hse_permit_core::{Permit, PermitStatus, Role, UserId};

use crate::error::{Denial, Result};

/// The subject of a permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    fn is_requester_of(&self, permit: &Permit) -> bool {
        permit.is_requester(&self.id)
    }
}

/// One row of the approval table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRow {
    pub from: PermitStatus,
    pub role: Role,
    pub to: PermitStatus,
}

const fn row(from: PermitStatus, role: Role, to: PermitStatus) -> TableRow {
    TableRow { from, role, to }
}

/// The approval table. Fixed; not configurable at runtime.
pub const APPROVAL_TABLE: &[TableRow] = &[
    row(PermitStatus::EnAttente, Role::Superviseur, PermitStatus::Valide),
    row(PermitStatus::Valide, Role::RespZone, PermitStatus::Valide),
    row(PermitStatus::Valide, Role::Hse, PermitStatus::EnCours),
    row(PermitStatus::EnCours, Role::Hse, PermitStatus::Cloture),
    row(PermitStatus::Suspendu, Role::Superviseur, PermitStatus::Valide),
];

/// Result of an allowed approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The slot label recorded on the approval.
    pub approval_role: Role,
    pub next_status: PermitStatus,
}

/// Table rows whose source is `status`, in table order.
pub fn rows_for(status: PermitStatus) -> impl Iterator<Item = &'static TableRow> {
    APPROVAL_TABLE.iter().filter(move |r| r.from == status)
}

/// Decide an approval attempt.
///
/// A non-`HSE` role is accepted only when the table has a row for
/// `(status, role)`; the label is then the role itself. `HSE` takes its own
/// row when one exists and otherwise fills the first slot of the status,
/// always labelled `HSE`.
pub fn decide(status: PermitStatus, role: Role) -> Result<Transition> {
    let mut rows = rows_for(status).peekable();
    let first = match rows.peek() {
        Some(r) => **r,
        None => return Err(Denial::NoApprovalStage { status }),
    };

    if let Some(r) = rows_for(status).find(|r| r.role == role) {
        return Ok(Transition {
            approval_role: role,
            next_status: r.to,
        });
    }

    if role == Role::Hse {
        return Ok(Transition {
            approval_role: Role::Hse,
            next_status: first.to,
        });
    }

    Err(Denial::RoleMismatch {
        role,
        status,
        expected: rows.map(|r| r.role).collect(),
    })
}

/// Suspension: `HSE` or `RESP_ZONE`, from an active status.
pub fn authorize_suspend(status: PermitStatus, role: Role) -> Result<PermitStatus> {
    if !matches!(role, Role::Hse | Role::RespZone) {
        return Err(Denial::SuspendNotAllowed { role });
    }
    if !status.is_active() {
        return Err(Denial::NotSuspendable { status });
    }
    Ok(PermitStatus::Suspendu)
}

/// Forced closure: `HSE`, `SUPERVISEUR` or the requester, from any status
/// except `CLOTURE`.
pub fn authorize_close(permit: &Permit, actor: &Actor) -> Result<PermitStatus> {
    if permit.status == PermitStatus::Cloture {
        return Err(Denial::AlreadyClosed);
    }
    let allowed = matches!(actor.role, Role::Hse | Role::Superviseur) || actor.is_requester_of(permit);
    if !allowed {
        return Err(Denial::CloseNotAllowed { role: actor.role });
    }
    Ok(PermitStatus::Cloture)
}

/// Submission of a draft for approval.
pub fn authorize_submit(permit: &Permit, actor: &Actor) -> Result<PermitStatus> {
    if permit.status != PermitStatus::Brouillon {
        return Err(Denial::NotSubmittable {
            status: permit.status,
        });
    }
    if !(actor.is_requester_of(permit) || actor.role == Role::Hse) {
        return Err(Denial::SubmitNotAllowed);
    }
    Ok(PermitStatus::EnAttente)
}

/// Content edits: the requester while editable, `HSE` always.
pub fn authorize_edit(permit: &Permit, actor: &Actor) -> Result<()> {
    if actor.role == Role::Hse {
        return Ok(());
    }
    if actor.is_requester_of(permit) && permit.status.is_editable() {
        return Ok(());
    }
    Err(Denial::EditNotAllowed {
        role: actor.role,
        status: permit.status,
    })
}
