//! Moving dependent records from a losing duplicate onto the survivor.
//!
//! Migration always runs before the loser is deleted: the store cascades a
//! delete to everything still attached to the loser.

use crate::{
    error::Result,
    survivor::Candidate,
    transaction::{blogs_of, local_drafts_of},
    Account, Blog, Entity, EntityKind, ObjectId, Transaction,
};
use serde::{Deserialize, Serialize};

/// A dependent row that was re-parented during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigratedDependent {
    pub kind: EntityKind,
    pub id: ObjectId,
    pub from: ObjectId,
    pub to: ObjectId,
}

/// Per-kind merge behaviour plugged into the generic deduplication loop.
pub trait DependentMigrator {
    type Entity: Entity;

    /// Describe a group member for survivor selection.
    fn candidate<T: Transaction>(&self, tx: &T, entity: &Self::Entity) -> Result<Candidate>;

    /// Re-parent the loser's dependents onto the survivor.
    fn migrate<T: Transaction>(
        &self,
        tx: &mut T,
        survivor: &Self::Entity,
        loser: &Self::Entity,
    ) -> Result<Vec<MigratedDependent>>;
}

/// Account merge: every blog of the loser moves to the survivor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountBlogs {
    pub default_account: Option<ObjectId>,
}

impl AccountBlogs {
    pub fn new(default_account: Option<ObjectId>) -> Self {
        Self { default_account }
    }
}

impl DependentMigrator for AccountBlogs {
    type Entity = Account;

    fn candidate<T: Transaction>(&self, _tx: &T, account: &Account) -> Result<Candidate> {
        Ok(Candidate::account(account.id, self.default_account))
    }

    fn migrate<T: Transaction>(
        &self,
        tx: &mut T,
        survivor: &Account,
        loser: &Account,
    ) -> Result<Vec<MigratedDependent>> {
        let mut moved = Vec::new();
        for mut blog in blogs_of(tx, loser.id)? {
            blog.account_id = Some(survivor.id);
            tx.update(&blog)?;
            moved.push(MigratedDependent {
                kind: EntityKind::Blog,
                id: blog.id,
                from: loser.id,
                to: survivor.id,
            });
        }
        Ok(moved)
    }
}

/// Blog merge: only local drafts move. Synced posts go with the loser and
/// are fetched again for the survivor on the next sync.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlogDrafts;

impl DependentMigrator for BlogDrafts {
    type Entity = Blog;

    fn candidate<T: Transaction>(&self, tx: &T, blog: &Blog) -> Result<Candidate> {
        let has_drafts = !local_drafts_of(tx, blog.id)?.is_empty();
        Ok(Candidate::blog(blog.id, has_drafts))
    }

    fn migrate<T: Transaction>(
        &self,
        tx: &mut T,
        survivor: &Blog,
        loser: &Blog,
    ) -> Result<Vec<MigratedDependent>> {
        let mut moved = Vec::new();
        for mut draft in local_drafts_of(tx, loser.id)? {
            draft.blog_id = survivor.id;
            tx.update(&draft)?;
            moved.push(MigratedDependent {
                kind: EntityKind::Post,
                id: draft.id,
                from: loser.id,
                to: survivor.id,
            });
        }
        Ok(moved)
    }
}
