//! # HSE Permit Permissions
//!
//! The permit state machine. Pure decision logic: given a permit's status and
//! an actor, decide whether an action is allowed and what the permit becomes.
//!
//! ## Approval Table
//!
//! | current      | required role | next       |
//! |--------------|---------------|------------|
//! | `EN_ATTENTE` | `SUPERVISEUR` | `VALIDE`   |
//! | `VALIDE`     | `RESP_ZONE`   | `VALIDE`   |
//! | `VALIDE`     | `HSE`         | `EN_COURS` |
//! | `EN_COURS`   | `HSE`         | `CLOTURE`  |
//! | `SUSPENDU`   | `SUPERVISEUR` | `VALIDE`   |
//!
//! `HSE` may fill any slot and always signs as `HSE`.
//!
//! ## Side Transitions
//!
//! These never produce a ledger approval:
//!
//! - **Suspension**: `HSE` or `RESP_ZONE`, from any active status.
//! - **Closure**: `HSE`, `SUPERVISEUR` or the requester, from any status but
//!   `CLOTURE`. This bypasses the `EN_COURS -> CLOTURE` approval slot.
//! - **Submission**: the requester (or `HSE`), `BROUILLON -> EN_ATTENTE`.
//!
//! ## Usage
//!
//! ```rust
//! use hse_permit_core::{PermitStatus, Role};
//! use hse_permit_perms::decide;
//!
//! let t = decide(PermitStatus::EnAttente, Role::Superviseur).unwrap();
//! assert_eq!(t.next_status, PermitStatus::Valide);
//! assert!(decide(PermitStatus::Valide, Role::Demandeur).is_err());
//! ```

pub mod error;
pub mod machine;

pub use error::{Denial, Result};
pub use machine::{
    authorize_close, authorize_edit, authorize_submit, authorize_suspend, decide, rows_for,
    Actor, TableRow, Transition, APPROVAL_TABLE,
};
