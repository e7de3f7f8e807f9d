//! Duplicate reconciliation for accounts and blogs.
//!
//! The same remote account or site can end up stored twice, for example
//! after signing in again on a device that still holds the old records.
//! A reconciliation pass merges such duplicates inside one transaction.
//!
//! # Algorithm
//!
//! 1. Fetch the candidates and sort them by object id
//! 2. Group them by remote identity; entities without one are left alone
//! 3. For every group with more than one member, select a survivor
//! 4. Move each loser's dependents onto the survivor, then delete the loser
//! 5. Commit once at the end, and only if something changed
//!
//! Account reconciliation always continues with blog reconciliation for each
//! surviving account, never the other way round.

use crate::{
    error::Result,
    group::group_by_identity,
    migrate::{AccountBlogs, BlogDrafts, DependentMigrator, MigratedDependent},
    survivor::{select_survivor, SurvivorRule},
    transaction::{blogs_of, default_account, fetch_all},
    Account, Blog, Entity, EntityKind, Error, ObjectId, RemoteId, Transaction,
};
use serde::{Deserialize, Serialize};

/// One merged duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedGroup {
    pub kind: EntityKind,
    /// The shared remote identity
    pub remote_id: RemoteId,
    pub survivor: ObjectId,
    /// Deleted members, in original order
    pub losers: Vec<ObjectId>,
    pub rule: SurvivorRule,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Duplicate groups that were merged
    pub merged: Vec<MergedGroup>,
    /// Dependents moved from losers to survivors
    pub migrated: Vec<MigratedDependent>,
    /// Blogs left out because they have no remote identity
    pub skipped_blogs: Vec<ObjectId>,
    /// Accounts whose stray default flag was cleared
    pub cleared_defaults: Vec<ObjectId>,
    /// Whether the pass wrote anything
    pub committed: bool,
}

impl ReconcileReport {
    /// Every entity deleted as a losing duplicate.
    pub fn deleted(&self) -> impl Iterator<Item = (EntityKind, ObjectId)> + '_ {
        self.merged
            .iter()
            .flat_map(|group| group.losers.iter().map(move |id| (group.kind, *id)))
    }

    /// Nothing needed to change.
    pub fn is_noop(&self) -> bool {
        self.merged.is_empty() && self.cleared_defaults.is_empty()
    }
}

/// Survivors and identity-less entities of one [`deduplicate`] run.
#[derive(Debug, Clone)]
pub struct Deduplicated<E> {
    /// Survivors of merged groups
    pub survivors: Vec<E>,
    /// Entities that could not take part in grouping
    pub without_identity: Vec<E>,
}

/// Merge duplicates among `entities`.
///
/// `key` extracts the remote identity and `migrator` supplies survivor
/// selection inputs and dependent migration for the entity kind.
pub fn deduplicate<T, M, K>(
    tx: &mut T,
    mut entities: Vec<M::Entity>,
    key: K,
    migrator: &M,
    report: &mut ReconcileReport,
) -> Result<Deduplicated<M::Entity>>
where
    T: Transaction,
    M: DependentMigrator,
    K: Fn(&M::Entity) -> Option<RemoteId>,
{
    let kind = <M::Entity as Entity>::KIND;
    entities.sort_by_key(Entity::object_id);

    let mut grouping = group_by_identity(entities, key);
    let without_identity = std::mem::take(&mut grouping.without_identity);
    let mut survivors = Vec::new();

    for group in grouping.duplicates() {
        let candidates = group
            .members
            .iter()
            .map(|member| migrator.candidate(&*tx, member))
            .collect::<Result<Vec<_>>>()?;
        let Some(selection) = select_survivor(&candidates) else {
            continue;
        };

        let mut losers = group.members;
        let survivor = losers.remove(selection.index);

        for loser in &losers {
            let moved = migrator.migrate(tx, &survivor, loser)?;
            tx.delete::<M::Entity>(loser.object_id())?;
            report.migrated.extend(moved);
        }

        tracing::info!(
            %kind,
            remote_id = group.key,
            survivor = survivor.object_id(),
            losers = losers.len(),
            rule = ?selection.rule,
            "merged duplicates"
        );
        report.merged.push(MergedGroup {
            kind,
            remote_id: group.key,
            survivor: survivor.object_id(),
            losers: losers.iter().map(Entity::object_id).collect(),
            rule: selection.rule,
        });
        survivors.push(survivor);
    }

    Ok(Deduplicated {
        survivors,
        without_identity,
    })
}

/// Runs one reconciliation pass over a transaction it owns.
///
/// The transaction is committed at the end of a successful pass. On error it
/// is dropped, which abandons every change made so far.
#[derive(Debug)]
pub struct Reconciler<T: Transaction> {
    tx: T,
    report: ReconcileReport,
}

impl<T: Transaction> Reconciler<T> {
    pub fn new(tx: T) -> Self {
        Self {
            tx,
            report: ReconcileReport::default(),
        }
    }

    /// Merge duplicate accounts, then duplicate blogs of every survivor.
    pub fn reconcile_accounts(mut self) -> Result<ReconcileReport> {
        let default = self.enforce_single_default()?;

        let accounts = fetch_all::<Account, _>(&self.tx)?;
        let merged = deduplicate(
            &mut self.tx,
            accounts,
            Account::remote_identity,
            &AccountBlogs::new(default),
            &mut self.report,
        )?;

        for account in &merged.without_identity {
            tracing::debug!(account = account.id, "account without remote identity");
        }
        for account in merged.survivors {
            self.deduplicate_blogs(account.id)?;
        }

        self.finish()
    }

    /// Merge duplicate blogs owned by one account.
    pub fn reconcile_blogs(mut self, account_id: ObjectId) -> Result<ReconcileReport> {
        if self.tx.get::<Account>(account_id)?.is_none() {
            return Err(Error::NotFound {
                kind: EntityKind::Account,
                id: account_id,
            });
        }
        self.deduplicate_blogs(account_id)?;
        self.finish()
    }

    fn deduplicate_blogs(&mut self, account_id: ObjectId) -> Result<()> {
        let blogs = blogs_of(&self.tx, account_id)?;
        let merged = deduplicate(
            &mut self.tx,
            blogs,
            Blog::remote_identity,
            &BlogDrafts,
            &mut self.report,
        )?;

        for blog in merged.without_identity {
            tracing::warn!(
                blog = blog.id,
                account = account_id,
                dot_com_id = ?blog.dot_com_id,
                "skipping blog without remote identity"
            );
            self.report.skipped_blogs.push(blog.id);
        }
        Ok(())
    }

    /// Make sure at most one account carries the default flag and return it.
    fn enforce_single_default(&mut self) -> Result<Option<ObjectId>> {
        let Some(default) = default_account(&self.tx)? else {
            return Ok(None);
        };

        let strays = self
            .tx
            .fetch(|account: &Account| account.is_default && account.id != default.id)?;
        for mut account in strays {
            account.is_default = false;
            self.tx.update(&account)?;
            self.report.cleared_defaults.push(account.id);
        }
        Ok(Some(default.id))
    }

    fn finish(mut self) -> Result<ReconcileReport> {
        if self.tx.has_pending_changes() {
            self.tx.commit()?;
            self.report.committed = true;
            tracing::info!(
                merged = self.report.merged.len(),
                migrated = self.report.migrated.len(),
                "reconciliation committed"
            );
        } else {
            tracing::debug!("reconciliation found nothing to merge");
        }
        Ok(self.report)
    }
}
