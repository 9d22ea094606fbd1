//! # HSE Permit
//!
//! The unified API for the work-permit workflow: a fixed multi-role
//! approval chain, PDF export of the permit and its ledger, and later
//! verification that neither was altered.
//!
//! ## Overview
//!
//! - **Permits** move `BROUILLON → EN_ATTENTE → VALIDE → EN_COURS → CLOTURE`,
//!   with `SUSPENDU` as a side state. Who may act where is decided by
//!   [`perms`].
//! - **Approvals** are appended to a per-permit ledger, each carrying a keyed
//!   BLAKE3 digest of `(permit_id, actor_id, timestamp)`.
//! - **Exports** render the permit and ledger to PDF; the digest of the bytes
//!   is stored with the permit.
//! - **Verification** re-hashes the stored file, re-renders the current data
//!   and re-derives every signature. Tampering is a report, not an error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hse_permit::{PermitService, ServiceConfig};
//! use hse_permit::perms::Actor;
//! use hse_permit::store::{FsDocumentStore, SqliteStore};
//! use hse_permit::core::{PermitId, Role, UserId};
//!
//! async fn example() {
//!     let config = ServiceConfig::from_toml_str(r#"signing_secret = "change-me""#).unwrap();
//!     let service = PermitService::new(
//!         SqliteStore::open("permits.db").unwrap(),
//!         FsDocumentStore::new("documents"),
//!         config,
//!     );
//!
//!     let supervisor = Actor::new(UserId::new(), Role::Superviseur);
//!     let permit_id = PermitId::new();
//!     let _ = service.attempt_approval(&permit_id, &supervisor, None, None).await;
//!     let _ = service.verify(&permit_id).await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `hse_permit::core` - Permit, approval and digest types
//! - `hse_permit::perms` - The state machine
//! - `hse_permit::store` - Storage abstraction, SQLite and document storage
//! - `hse_permit::render` - PDF rendering

pub mod config;
pub mod error;
pub mod export;
pub mod service;
pub mod verify;

// Re-export component crates
pub use hse_permit_core as core;
pub use hse_permit_perms as perms;
pub use hse_permit_render as render;
pub use hse_permit_store as store;

// Re-export main types for convenience
pub use config::ServiceConfig;
pub use error::{Result, WorkflowError};
pub use export::{document_path, ExportedDocument};
pub use service::{PermitService, PermitView};
pub use verify::{
    check_approval, ApprovalCheck, IntegrityVerifier, SignatureFault, VerificationReport,
};
