//! Repair of rows whose owner has gone missing.
//!
//! A well-behaved store never produces orphans because deletes cascade, but
//! state restored from older snapshots or written by older clients can still
//! contain them. Local drafts are never deleted here.

use crate::{
    error::Result,
    error::Error,
    transaction::{blogs_of, fetch_all},
    Account, Blog, Entity, EntityKind, ObjectId, Post, Transaction,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of a sanitize pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizeReport {
    /// Synced posts deleted because their blog is gone
    pub deleted_posts: Vec<ObjectId>,
    /// Orphaned local drafts left in place
    pub kept_drafts: Vec<ObjectId>,
    /// Blogs whose missing owner reference was cleared
    pub detached_blogs: Vec<ObjectId>,
    pub committed: bool,
}

fn ids_of<T: Transaction, E: Entity>(tx: &T) -> Result<BTreeSet<ObjectId>> {
    Ok(fetch_all::<E, T>(tx)?.iter().map(Entity::object_id).collect())
}

/// Delete synced orphan posts and detach blogs from missing accounts.
///
/// Orphaned local drafts are reported and kept: they are the only copy of the
/// user's work.
pub fn sanitize_orphans<T: Transaction>(mut tx: T) -> Result<SanitizeReport> {
    let mut report = SanitizeReport::default();

    let blogs = ids_of::<T, Blog>(&tx)?;
    for post in tx.fetch(|post: &Post| !blogs.contains(&post.blog_id))? {
        if post.is_local_draft() {
            tracing::warn!(
                post = post.id,
                blog = post.blog_id,
                "keeping local draft of a missing blog"
            );
            report.kept_drafts.push(post.id);
        } else {
            tx.delete::<Post>(post.id)?;
            report.deleted_posts.push(post.id);
        }
    }

    let accounts = ids_of::<T, Account>(&tx)?;
    let orphaned = tx.fetch(|blog: &Blog| {
        blog.account_id
            .is_some_and(|account| !accounts.contains(&account))
    })?;
    for mut blog in orphaned {
        tracing::debug!(
            blog = blog.id,
            account = ?blog.account_id,
            "detaching blog from missing account"
        );
        blog.account_id = None;
        tx.update(&blog)?;
        report.detached_blogs.push(blog.id);
    }

    if !report.deleted_posts.is_empty() || !report.detached_blogs.is_empty() {
        tracing::info!(
            deleted_posts = report.deleted_posts.len(),
            detached_blogs = report.detached_blogs.len(),
            "sanitized orphans"
        );
    }
    if tx.has_pending_changes() {
        tx.commit()?;
        report.committed = true;
    }
    Ok(report)
}

/// Delete `account_id` if it is not the default and owns no blogs.
///
/// Callers invoke this for one account after removing one of its sites. An
/// account without sites is otherwise a valid state, so no pass sweeps for
/// them. Returns whether the account was deleted.
pub fn purge_account_if_unused<T: Transaction>(mut tx: T, account_id: ObjectId) -> Result<bool> {
    let account = tx.get::<Account>(account_id)?.ok_or(Error::NotFound {
        kind: EntityKind::Account,
        id: account_id,
    })?;
    if account.is_default || !blogs_of(&tx, account_id)?.is_empty() {
        return Ok(false);
    }

    tx.delete::<Account>(account_id)?;
    tx.commit()?;
    tracing::info!(account = account_id, "purged account without blogs");
    Ok(true)
}
