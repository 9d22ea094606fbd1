//! # HSE Permit Testkit
//!
//! Testing utilities for the permit workflow.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a ready service with one actor per role, and helpers that
//!   walk a permit up to a given status
//! - **Generators**: Proptest strategies for roles, statuses, drafts and
//!   signature inputs
//! - **Gated store**: a `Store` wrapper that holds readers at a barrier, so
//!   concurrent transitions can be forced to read the same revision
//! - **Slow renderer**: a renderer that overruns, for timeout tests
//!
//! The cross-crate integration tests live in `tests/`.
//!
//! ## Test Fixtures
//!
//! ```rust
//! use hse_permit_testkit::TestFixture;
//!
//! # tokio_test_block_on(async {
//! let fx = TestFixture::new();
//! let permit = fx.pending_permit().await.unwrap();
//! let view = fx
//!     .service
//!     .attempt_approval(&permit.id, &fx.actors.supervisor, None, None)
//!     .await
//!     .unwrap();
//! assert_eq!(view.approvals.len(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod fixtures;
pub mod gated;
pub mod generators;

pub use fixtures::{sample_draft, signing_secret, Actors, SlowRenderer, TestFixture, TEST_SECRET};
pub use gated::GatedStore;
pub use generators::{actor, permit_draft, permit_status, role, SignatureInputs};
