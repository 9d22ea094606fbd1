//! Refusal reasons for the permit state machine.

use hse_permit_core::{PermitStatus, Role};
use thiserror::Error;

/// Why an action on a permit was refused.
///
/// Every variant names the concrete reason so callers can explain it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    /// No approval slot exists in this status.
    #[error("no approval is possible while the permit is {status}")]
    NoApprovalStage { status: PermitStatus },

    /// The actor's role does not fill the slot required by the current status.
    #[error("role {role} cannot approve a permit in status {status} (expected one of {expected:?})")]
    RoleMismatch {
        role: Role,
        status: PermitStatus,
        expected: Vec<Role>,
    },

    #[error("role {role} is not allowed to suspend permits")]
    SuspendNotAllowed { role: Role },

    #[error("a permit in status {status} cannot be suspended")]
    NotSuspendable { status: PermitStatus },

    #[error("role {role} is not allowed to close this permit")]
    CloseNotAllowed { role: Role },

    #[error("permit is already closed")]
    AlreadyClosed,

    #[error("only the requester may submit this permit")]
    SubmitNotAllowed,

    #[error("a permit in status {status} cannot be submitted")]
    NotSubmittable { status: PermitStatus },

    #[error("role {role} may not edit a permit in status {status}")]
    EditNotAllowed { role: Role, status: PermitStatus },
}

/// Result type for permission decisions.
pub type Result<T> = std::result::Result<T, Denial>;
