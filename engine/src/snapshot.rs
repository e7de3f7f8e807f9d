//! Snapshot types for persisting and restoring store state.
//!
//! Snapshots are the bridge between the in-memory store and whatever holds
//! the object graph on disk. Every table is a `BTreeMap` keyed by object id,
//! so serialization is deterministic.

use crate::{
    error::Result, Account, Blog, CachedLikeUser, Entity, Error, ObjectId, Post, Row,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Last object id handed out by the store
    pub last_id: ObjectId,
    #[serde(default)]
    pub accounts: BTreeMap<ObjectId, Account>,
    #[serde(default)]
    pub blogs: BTreeMap<ObjectId, Blog>,
    #[serde(default)]
    pub posts: BTreeMap<ObjectId, Post>,
    #[serde(default)]
    pub cached_like_users: BTreeMap<ObjectId, CachedLikeUser>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

fn check_keys<E: Entity>(table: &BTreeMap<ObjectId, E>) -> Result<()> {
    for (key, entity) in table {
        if *key == 0 || *key != entity.object_id() {
            return Err(Error::InvalidSnapshot(format!(
                "{} stored under key {key} has id {}",
                E::KIND,
                entity.object_id()
            )));
        }
    }
    Ok(())
}

impl StoreSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            last_id: 0,
            accounts: BTreeMap::new(),
            blogs: BTreeMap::new(),
            posts: BTreeMap::new(),
            cached_like_users: BTreeMap::new(),
        }
    }

    /// Add a row to the table of its kind.
    pub fn add_row(&mut self, row: Row) {
        match row {
            Row::Account(account) => {
                self.accounts.insert(account.id, account);
            }
            Row::Blog(blog) => {
                self.blogs.insert(blog.id, blog);
            }
            Row::Post(post) => {
                self.posts.insert(post.id, post);
            }
            Row::CachedLikeUser(user) => {
                self.cached_like_users.insert(user.id, user);
            }
        }
    }

    /// Consume the snapshot, yielding every row.
    pub fn into_rows(self) -> impl Iterator<Item = Row> {
        self.accounts
            .into_values()
            .map(Row::Account)
            .chain(self.blogs.into_values().map(Row::Blog))
            .chain(self.posts.into_values().map(Row::Post))
            .chain(self.cached_like_users.into_values().map(Row::CachedLikeUser))
    }

    /// Total number of rows.
    pub fn row_count(&self) -> usize {
        self.accounts.len() + self.blogs.len() + self.posts.len() + self.cached_like_users.len()
    }

    /// Highest object id of any row, or 0 for an empty snapshot.
    pub fn max_object_id(&self) -> ObjectId {
        [
            self.accounts.keys().next_back(),
            self.blogs.keys().next_back(),
            self.posts.keys().next_back(),
            self.cached_like_users.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or(0)
    }

    /// Check the format version and that every row sits under its own id.
    ///
    /// References between rows are not checked here; a store imports
    /// orphaned rows and leaves them for sanitizing.
    pub fn validate(&self) -> Result<()> {
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        check_keys(&self.accounts)?;
        check_keys(&self.blogs)?;
        check_keys(&self.posts)?;
        check_keys(&self.cached_like_users)
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub last_id: ObjectId,
    pub account_count: usize,
    pub blog_count: usize,
    pub post_count: usize,
    pub cached_like_user_count: usize,
}

impl From<&StoreSnapshot> for SnapshotMetadata {
    fn from(snapshot: &StoreSnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            last_id: snapshot.last_id,
            account_count: snapshot.accounts.len(),
            blog_count: snapshot.blogs.len(),
            post_count: snapshot.posts.len(),
            cached_like_user_count: snapshot.cached_like_users.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LikeTarget;
    use chrono::{TimeZone, Utc};

    fn row<E: Entity>(mut entity: E, id: ObjectId) -> Row {
        entity.set_object_id(id);
        entity.into_row()
    }

    fn sample() -> StoreSnapshot {
        let fetched = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let mut snapshot = StoreSnapshot::new();
        snapshot.last_id = 4;
        snapshot.add_row(row(Account::new(7, "ann").as_default(), 1));
        snapshot.add_row(row(Blog::new("https://a.example").owned_by(1).with_dot_com_id(42), 2));
        snapshot.add_row(row(Post::draft(2, "idea"), 3));
        snapshot.add_row(row(
            CachedLikeUser::new(10, 42, LikeTarget::Post(100), fetched),
            4,
        ));
        snapshot
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = StoreSnapshot::new();
        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.row_count(), 0);
        assert_eq!(snapshot.max_object_id(), 0);
    }

    #[test]
    fn json_roundtrip() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        assert_eq!(StoreSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn deterministic_serialization() {
        let mut forward = StoreSnapshot::new();
        let mut backward = StoreSnapshot::new();
        let rows: Vec<Row> = sample().into_rows().collect();

        for r in rows.iter().cloned() {
            forward.add_row(r);
        }
        for r in rows.into_iter().rev() {
            backward.add_row(r);
        }

        assert_eq!(forward.to_json().unwrap(), backward.to_json().unwrap());
    }

    #[test]
    fn max_object_id_spans_tables() {
        let mut snapshot = sample();
        snapshot.add_row(row(Blog::new("late"), 30));
        assert_eq!(snapshot.max_object_id(), 30);
    }

    #[test]
    fn reject_future_format_version() {
        let json = r#"{"formatVersion": 999, "lastId": 0}"#;
        let result = StoreSnapshot::from_json(json);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn missing_tables_default_to_empty() {
        let snapshot = StoreSnapshot::from_json(r#"{"formatVersion": 1, "lastId": 3}"#).unwrap();
        assert_eq!(snapshot.row_count(), 0);
        assert_eq!(snapshot.last_id, 3);
    }

    #[test]
    fn reject_mismatched_keys() {
        let mut snapshot = sample();
        let mut account = Account::new(8, "bob");
        account.id = 5;
        snapshot.accounts.insert(6, account);
        assert!(matches!(snapshot.validate(), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn snapshot_metadata() {
        let metadata = SnapshotMetadata::from(&sample());
        assert_eq!(metadata.last_id, 4);
        assert_eq!(metadata.account_count, 1);
        assert_eq!(metadata.blog_count, 1);
        assert_eq!(metadata.post_count, 1);
        assert_eq!(metadata.cached_like_user_count, 1);
    }
}
