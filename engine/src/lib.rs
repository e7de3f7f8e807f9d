//! # Tidy Engine
//!
//! Duplicate-entity reconciliation for a locally persisted blogging client.
//!
//! The same remote account or site can end up stored more than once on a
//! device, for example after signing out and back in while an older copy of
//! the data is still around. This crate merges such duplicates without losing
//! unsynced user work, and keeps auxiliary caches from growing without bound.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine sees a [`Transaction`], never a database or file
//! - **Deterministic**: candidates are processed in object id order, so the
//!   same state always yields the same merge
//! - **No lost drafts**: a local draft is never deleted by any pass
//! - **One commit per pass**: a failed pass leaves the store untouched
//!
//! ## Core Concepts
//!
//! ### Object graph
//!
//! [`Account`] owns [`Blog`]s, a [`Blog`] owns [`Post`]s. A post without a
//! positive remote id is a local draft. [`CachedLikeUser`] rows are a cache of
//! like lists and expire after a retention window.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] groups entities by remote identity, selects one survivor
//! per group, moves dependents from the losers onto it, and deletes the losers:
//!
//! - The default account always survives an account merge
//! - Otherwise the first blog holding local drafts survives a blog merge
//! - Otherwise the earliest record survives
//!
//! ## Quick Start
//!
//! ```rust
//! use tidy_engine::{Account, Blog, MemoryStore, Post, Transaction};
//!
//! let store = MemoryStore::new();
//! let mut tx = store.begin();
//! let account = tx.insert(Account::new(7, "ann").as_default()).unwrap();
//! let a = tx.insert(Blog::new("https://a.example").owned_by(account).with_dot_com_id(42)).unwrap();
//! let b = tx.insert(Blog::new("https://a.example").owned_by(account).with_dot_com_id(42)).unwrap();
//! tx.insert(Post::draft(b, "unsynced idea")).unwrap();
//! tx.commit().unwrap();
//!
//! let report = store.reconcile_blogs(account).unwrap();
//! assert!(report.committed);
//!
//! // The blog holding the draft survived.
//! assert!(store.get::<Blog>(a).unwrap().is_none());
//! assert!(store.get::<Blog>(b).unwrap().is_some());
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for the mobile host.
//! All data is exchanged as JSON strings.
//!
//! ## Persistence
//!
//! [`MemoryStore`] is the reference [`Transaction`] implementation. Use
//! [`MemoryStore::export_state`] and [`MemoryStore::import_state`] with
//! [`StoreSnapshot`] to persist it.

pub mod clock;
pub mod error;
pub mod ffi;
pub mod group;
pub mod migrate;
pub mod model;
pub mod purge;
pub mod reconcile;
pub mod sanitize;
pub mod snapshot;
pub mod store;
pub mod survivor;
pub mod transaction;

// Re-export main types at crate root
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::Error;
pub use migrate::{AccountBlogs, BlogDrafts, DependentMigrator, MigratedDependent};
pub use model::{
    Account, Blog, CachedLikeUser, Entity, EntityKind, LikeTarget, Post, Row, RowKey,
};
pub use purge::{PurgeReport, RetentionPolicy, DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS};
pub use reconcile::{MergedGroup, ReconcileReport, Reconciler};
pub use sanitize::SanitizeReport;
pub use snapshot::{SnapshotMetadata, StoreSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{MemoryStore, MemoryTransaction};
pub use survivor::{Candidate, SurvivorRule};
pub use transaction::Transaction;

/// Local object id, assigned by the store
pub type ObjectId = u64;
/// Identifier on the remote service
pub type RemoteId = i64;
