//! # HSE Permit Store
//!
//! Storage abstraction for the permit workflow. Permits, the approval ledger
//! and the audit log sit behind the [`Store`] trait; exported documents sit
//! behind [`DocumentStore`].
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for permit, ledger and audit persistence
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`TransitionCommit`] - One atomic status change (+ optional approval + audit)
//! - [`DocumentStore`] - Where rendered PDFs live ([`FsDocumentStore`], [`MemoryDocumentStore`])
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hse_permit_store::{SqliteStore, Store};
//! use hse_permit_core::PermitId;
//!
//! async fn example() {
//!     let store = SqliteStore::open("permits.db").unwrap();
//!     let permit = store.get_permit(&PermitId::new()).await.unwrap();
//!     assert!(permit.is_none());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Append-only ledger**: there is no update or delete for approvals. The
//!   SQLite schema additionally rejects `UPDATE`/`DELETE` on `approvals` with
//!   triggers.
//! - **Optimistic concurrency**: every status change and content edit is a
//!   check-and-set on `(permit_id, status, revision)`. Losing the race yields
//!   [`StoreError::Conflict`] and writes nothing.
//! - **Atomic transitions**: the approval, the status write and the audit
//!   event of a [`TransitionCommit`] persist together or not at all.
//! - **Export facts**: `document_*` columns are written only by
//!   [`Store::record_document`].

pub mod documents;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use documents::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Store, TransitionCommit};
