//! Store - the in-memory object graph.
//!
//! [`MemoryStore`] is a shared, thread-safe table of rows. Work happens in a
//! [`MemoryTransaction`], which keeps a private change set on top of the
//! shared rows and publishes it row by row on commit. Rows a transaction did
//! not touch are never overwritten, so unrelated readers and writers can use
//! the store while a reconciliation pass is running.
//!
//! Delete rules follow the host persistence model: deleting an account
//! deletes its blogs, deleting a blog deletes its posts.

use crate::{
    clock::Clock,
    error::Result,
    purge::{purge_stale_cached_users, PurgeReport},
    reconcile::{ReconcileReport, Reconciler},
    sanitize::{purge_account_if_unused, sanitize_orphans, SanitizeReport},
    snapshot::StoreSnapshot,
    Entity, EntityKind, Error, ObjectId, Row, RowKey, Transaction,
};
use chrono::TimeDelta;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Rows = BTreeMap<RowKey, Row>;

fn kind_range(kind: EntityKind) -> RangeInclusive<RowKey> {
    (kind, ObjectId::MIN)..=(kind, ObjectId::MAX)
}

/// The kind whose rows are deleted along with a row of `kind`.
fn dependent_kind(kind: EntityKind) -> Option<EntityKind> {
    match kind {
        EntityKind::Account => Some(EntityKind::Blog),
        EntityKind::Blog => Some(EntityKind::Post),
        EntityKind::Post | EntityKind::CachedLikeUser => None,
    }
}

#[derive(Debug, Default)]
struct Shared {
    rows: RwLock<Rows>,
    /// Last object id handed out
    last_id: AtomicU64,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Rows>> {
        self.rows.read().map_err(|_| Error::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Rows>> {
        self.rows.write().map_err(|_| Error::LockPoisoned)
    }

    fn allocate_id(&self) -> ObjectId {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Shared handle to an in-memory object store. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new transaction.
    pub fn begin(&self) -> MemoryTransaction {
        MemoryTransaction {
            shared: Arc::clone(&self.shared),
            changes: BTreeMap::new(),
        }
    }

    /// Read committed entities without opening a write transaction.
    pub fn fetch<E, F>(&self, predicate: F) -> Result<Vec<E>>
    where
        E: Entity,
        F: Fn(&E) -> bool,
    {
        self.begin().fetch(predicate)
    }

    /// Read a committed entity by id.
    pub fn get<E: Entity>(&self, id: ObjectId) -> Result<Option<E>> {
        self.begin().get(id)
    }

    /// Number of committed entities of type `E`.
    pub fn count<E: Entity>(&self) -> Result<usize> {
        Ok(self.shared.read()?.range(kind_range(E::KIND)).count())
    }

    /// Merge duplicate accounts and the blogs of every surviving account.
    pub fn reconcile_accounts(&self) -> Result<ReconcileReport> {
        Reconciler::new(self.begin()).reconcile_accounts()
    }

    /// Merge duplicate blogs owned by one account.
    pub fn reconcile_blogs(&self, account_id: ObjectId) -> Result<ReconcileReport> {
        Reconciler::new(self.begin()).reconcile_blogs(account_id)
    }

    /// Delete cached like users fetched longer ago than `retention`.
    pub fn purge_stale_cached_users(
        &self,
        retention: TimeDelta,
        clock: &dyn Clock,
    ) -> Result<PurgeReport> {
        purge_stale_cached_users(self.begin(), retention, clock.now())
    }

    /// Repair rows whose owner no longer exists.
    pub fn sanitize_orphans(&self) -> Result<SanitizeReport> {
        sanitize_orphans(self.begin())
    }

    /// Delete one account if it is not the default and owns no blog.
    pub fn purge_account_if_unused(&self, account_id: ObjectId) -> Result<bool> {
        purge_account_if_unused(self.begin(), account_id)
    }

    /// Export the committed state as a snapshot.
    pub fn export_state(&self) -> Result<StoreSnapshot> {
        let rows = self.shared.read()?;
        let mut snapshot = StoreSnapshot::new();
        snapshot.last_id = self.shared.last_id.load(Ordering::Relaxed);
        for row in rows.values() {
            snapshot.add_row(row.clone());
        }
        Ok(snapshot)
    }

    /// Replace the committed state with a snapshot's rows.
    pub fn import_state(&self, snapshot: StoreSnapshot) -> Result<()> {
        snapshot.validate()?;

        let last_id = snapshot.last_id.max(snapshot.max_object_id());
        let imported: Rows = snapshot.into_rows().map(|row| (row.key(), row)).collect();

        let dangling = imported
            .values()
            .filter_map(Row::parent)
            .filter(|parent| !imported.contains_key(parent))
            .count();
        if dangling > 0 {
            tracing::warn!(dangling, "imported snapshot contains orphaned rows");
        }

        let mut rows = self.shared.write()?;
        *rows = imported;
        self.shared.last_id.store(last_id, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Change {
    Put(Row),
    Delete,
}

/// A transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    changes: BTreeMap<RowKey, Change>,
}

impl MemoryTransaction {
    fn lookup(&self, key: RowKey) -> Result<Option<Row>> {
        match self.changes.get(&key) {
            Some(Change::Put(row)) => Ok(Some(row.clone())),
            Some(Change::Delete) => Ok(None),
            None => Ok(self.shared.read()?.get(&key).cloned()),
        }
    }

    /// All rows of one kind as seen by this transaction.
    fn rows_of_kind(&self, kind: EntityKind) -> Result<BTreeMap<ObjectId, Row>> {
        let mut rows: BTreeMap<ObjectId, Row> = self
            .shared
            .read()?
            .range(kind_range(kind))
            .map(|((_, id), row)| (*id, row.clone()))
            .collect();

        for ((_, id), change) in self.changes.range(kind_range(kind)) {
            match change {
                Change::Put(row) => {
                    rows.insert(*id, row.clone());
                }
                Change::Delete => {
                    rows.remove(id);
                }
            }
        }
        Ok(rows)
    }

    fn check_parent(&self, row: &Row) -> Result<()> {
        if let Some((parent_kind, parent_id)) = row.parent() {
            if self.lookup((parent_kind, parent_id))?.is_none() {
                return Err(Error::DanglingReference {
                    kind: row.kind(),
                    id: row.object_id(),
                    parent_kind,
                    parent_id,
                });
            }
        }
        Ok(())
    }

    fn delete_cascading(&mut self, key: RowKey) -> Result<()> {
        if let Some(kind) = dependent_kind(key.0) {
            let dependents: Vec<RowKey> = self
                .rows_of_kind(kind)?
                .values()
                .filter(|row| row.parent() == Some(key))
                .map(Row::key)
                .collect();
            for dependent in dependents {
                self.delete_cascading(dependent)?;
            }
        }
        self.changes.insert(key, Change::Delete);
        Ok(())
    }

    /// Check the change set against the latest committed rows.
    fn validate(&self, rows: &Rows) -> Result<()> {
        let exists = |key: &RowKey| match self.changes.get(key) {
            Some(Change::Put(_)) => true,
            Some(Change::Delete) => false,
            None => rows.contains_key(key),
        };

        for (key, change) in &self.changes {
            let Change::Put(row) = change else {
                continue;
            };
            let Some(parent) = row.parent() else {
                continue;
            };
            let unchanged = rows.get(key).and_then(Row::parent) == Some(parent);
            if !exists(&parent) && !unchanged {
                return Err(Error::DanglingReference {
                    kind: key.0,
                    id: key.1,
                    parent_kind: parent.0,
                    parent_id: parent.1,
                });
            }
        }

        let deleted: BTreeSet<RowKey> = self
            .changes
            .iter()
            .filter(|(_, change)| matches!(change, Change::Delete))
            .map(|(key, _)| *key)
            .collect();
        if deleted.is_empty() {
            return Ok(());
        }

        // Rows committed by someone else since our cascade ran.
        let added_concurrently = rows.iter().find(|(key, row)| {
            !self.changes.contains_key(*key)
                && row.parent().is_some_and(|parent| deleted.contains(&parent))
        });
        if let Some(((kind, id), _)) = added_concurrently {
            return Err(Error::Conflict(format!(
                "{kind} {id} belongs to a row deleted by this transaction"
            )));
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn fetch<E, F>(&self, predicate: F) -> Result<Vec<E>>
    where
        E: Entity,
        F: Fn(&E) -> bool,
    {
        Ok(self
            .rows_of_kind(E::KIND)?
            .values()
            .filter_map(E::from_row)
            .filter(|entity| predicate(*entity))
            .cloned()
            .collect())
    }

    fn get<E: Entity>(&self, id: ObjectId) -> Result<Option<E>> {
        Ok(self
            .lookup((E::KIND, id))?
            .as_ref()
            .and_then(E::from_row)
            .cloned())
    }

    fn insert<E: Entity>(&mut self, mut entity: E) -> Result<ObjectId> {
        let id = self.shared.allocate_id();
        entity.set_object_id(id);
        let row = entity.into_row();
        self.check_parent(&row)?;
        self.changes.insert(row.key(), Change::Put(row));
        Ok(id)
    }

    fn update<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let key = (E::KIND, entity.object_id());
        let existing = self.lookup(key)?.ok_or(Error::NotFound {
            kind: key.0,
            id: key.1,
        })?;

        let row = entity.clone().into_row();
        // Rows that were already orphaned stay editable.
        if row.parent() != existing.parent() {
            self.check_parent(&row)?;
        }
        self.changes.insert(key, Change::Put(row));
        Ok(())
    }

    fn delete<E: Entity>(&mut self, id: ObjectId) -> Result<()> {
        let key = (E::KIND, id);
        if self.lookup(key)?.is_none() {
            return Err(Error::NotFound { kind: key.0, id });
        }
        self.delete_cascading(key)
    }

    fn commit(&mut self) -> Result<()> {
        if self.changes.is_empty() {
            return Ok(());
        }

        let mut rows = self.shared.write()?;
        self.validate(&rows)?;

        for (key, change) in std::mem::take(&mut self.changes) {
            match change {
                Change::Put(row) => {
                    rows.insert(key, row);
                }
                Change::Delete => {
                    rows.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}
