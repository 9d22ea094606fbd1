//! # HSE Permit Core
//!
//! Pure primitives for the HSE work-permit workflow: identifiers, statuses,
//! roles, permits, approvals, and the keyed signature digests that bind an
//! approval to a permit, an actor and a point in time.
//!
//! This crate contains no I/O, no storage, no rendering.
//!
//! ## Key Types
//!
//! - [`Permit`] - The work-authorization record moving through the lifecycle
//! - [`Approval`] - One ledger entry recording a role's sign-off
//! - [`PermitStatus`] / [`Role`] - Closed enumerations driving the state machine
//! - [`SignatureDigest`] - Keyed BLAKE3 digest over `(permit, actor, timestamp)`
//! - [`DocumentDigest`] - BLAKE3 digest of a rendered export
//!
//! ## Signatures
//!
//! Signature digests are a shared-secret MAC, not a per-user signature: anyone
//! holding the [`SigningSecret`] can produce a valid digest for any actor.
//! Rotating the secret invalidates every digest issued under the old one.

pub mod approval;
pub mod audit;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod permit;
pub mod types;
pub mod validation;

pub use approval::{Approval, ApprovalLedger};
pub use audit::{AuditAction, AuditEvent, PERMITS_TABLE};
pub use canonical::{canonical_json, merge_fields, FieldMap};
pub use crypto::{
    derive_signature, verify_signature, DocumentDigest, SignatureDigest, SigningSecret,
    SIGNATURE_DOMAIN,
};
pub use error::{Result, ValidationError};
pub use permit::{DocumentRecord, Permit, PermitDraft, PermitNumber, PermitPatch};
pub use types::{
    now_millis, ApprovalId, Decision, PermitId, PermitStatus, PermitTypeId, Role, UserId, ZoneId,
};
pub use validation::{validate_draft, validate_permit};
