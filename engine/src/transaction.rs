//! The persistence transaction the reconciliation core runs against.
//!
//! Every reconciliation pass works inside exactly one transaction and commits
//! at most once, at the end. Dropping a transaction without committing
//! abandons all of its changes.

use crate::{error::Result, Account, Blog, Entity, ObjectId, Post};

/// A unit of work over the persisted object graph.
pub trait Transaction {
    /// Fetch every entity of type `E` matching `predicate`, in ascending
    /// object id order. Reads observe this transaction's own changes.
    fn fetch<E, F>(&self, predicate: F) -> Result<Vec<E>>
    where
        E: Entity,
        F: Fn(&E) -> bool;

    /// Fetch a single entity by object id.
    fn get<E: Entity>(&self, id: ObjectId) -> Result<Option<E>>;

    /// Insert a new entity. The store assigns and returns its object id.
    fn insert<E: Entity>(&mut self, entity: E) -> Result<ObjectId>;

    /// Write back a modified entity.
    fn update<E: Entity>(&mut self, entity: &E) -> Result<()>;

    /// Delete an entity. Dependent rows are deleted with it.
    fn delete<E: Entity>(&mut self, id: ObjectId) -> Result<()>;

    /// Atomically publish all pending changes.
    fn commit(&mut self) -> Result<()>;

    /// Whether anything would be written by [`commit`](Self::commit).
    fn has_pending_changes(&self) -> bool;
}

/// All entities of type `E`.
pub fn fetch_all<E: Entity, T: Transaction>(tx: &T) -> Result<Vec<E>> {
    tx.fetch(|_: &E| true)
}

/// Blogs owned by an account.
pub fn blogs_of<T: Transaction>(tx: &T, account_id: ObjectId) -> Result<Vec<Blog>> {
    tx.fetch(|blog: &Blog| blog.account_id == Some(account_id))
}

/// Posts belonging to a blog.
pub fn posts_of<T: Transaction>(tx: &T, blog_id: ObjectId) -> Result<Vec<Post>> {
    tx.fetch(|post: &Post| post.blog_id == blog_id)
}

/// Unsynced posts belonging to a blog.
pub fn local_drafts_of<T: Transaction>(tx: &T, blog_id: ObjectId) -> Result<Vec<Post>> {
    tx.fetch(|post: &Post| post.blog_id == blog_id && post.is_local_draft())
}

/// The current default account.
///
/// At most one account should carry the flag. If the store is inconsistent
/// the lowest object id wins and the others are logged.
pub fn default_account<T: Transaction>(tx: &T) -> Result<Option<Account>> {
    let mut defaults = tx.fetch(|account: &Account| account.is_default)?;
    if defaults.len() > 1 {
        tracing::warn!(
            count = defaults.len(),
            "multiple default accounts, keeping the oldest"
        );
    }
    Ok(if defaults.is_empty() {
        None
    } else {
        Some(defaults.remove(0))
    })
}
