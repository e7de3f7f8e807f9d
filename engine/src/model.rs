//! Entity types for the persisted object graph.
//!
//! Only the attributes reconciliation reads are modelled here. Relationships
//! are stored on the child side (a [`Blog`] knows its owning [`Account`], a
//! [`Post`] knows its owning [`Blog`]); the "collection" views are queries
//! over a [`Transaction`](crate::Transaction).

use crate::{ObjectId, RemoteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of entity held by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Account,
    Blog,
    Post,
    CachedLikeUser,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Account => write!(f, "account"),
            EntityKind::Blog => write!(f, "blog"),
            EntityKind::Post => write!(f, "post"),
            EntityKind::CachedLikeUser => write!(f, "cached like user"),
        }
    }
}

/// Key of a row in a store: entity kind plus local object id.
pub type RowKey = (EntityKind, ObjectId);

/// Treat missing and non-positive remote ids as "no identity".
fn positive(id: Option<RemoteId>) -> Option<RemoteId> {
    id.filter(|id| *id > 0)
}

/// A signed-in account on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Local object id, assigned by the store on insert
    pub id: ObjectId,
    /// Remote user id
    pub user_id: RemoteId,
    pub username: String,
    /// At most one account in a store carries this flag
    pub is_default: bool,
}

impl Account {
    /// Create a non-default account.
    pub fn new(user_id: RemoteId, username: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id,
            username: username.into(),
            is_default: false,
        }
    }

    /// Mark the account as the default one.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Remote identity used for duplicate detection.
    pub fn remote_identity(&self) -> Option<RemoteId> {
        positive(Some(self.user_id))
    }
}

/// A site, optionally owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: ObjectId,
    /// Owning account; `None` for self-hosted sites added without an account
    pub account_id: Option<ObjectId>,
    /// Remote site id; missing or non-positive for sites the service doesn't know
    pub dot_com_id: Option<RemoteId>,
    pub url: String,
}

impl Blog {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: 0,
            account_id: None,
            dot_com_id: None,
            url: url.into(),
        }
    }

    pub fn with_dot_com_id(mut self, dot_com_id: RemoteId) -> Self {
        self.dot_com_id = Some(dot_com_id);
        self
    }

    pub fn owned_by(mut self, account_id: ObjectId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Remote identity used for duplicate detection.
    pub fn remote_identity(&self) -> Option<RemoteId> {
        positive(self.dot_com_id)
    }
}

/// A post belonging to a blog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: ObjectId,
    pub blog_id: ObjectId,
    /// Remote post id; absent or non-positive until the post is uploaded
    pub post_id: Option<RemoteId>,
    pub title: String,
}

impl Post {
    /// A post created on the device and never uploaded.
    pub fn draft(blog_id: ObjectId, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            blog_id,
            post_id: None,
            title: title.into(),
        }
    }

    /// A post that exists on the remote service.
    pub fn synced(blog_id: ObjectId, post_id: RemoteId, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            blog_id,
            post_id: Some(post_id),
            title: title.into(),
        }
    }

    /// Unsynced user work: no positive remote post id.
    pub fn is_local_draft(&self) -> bool {
        positive(self.post_id).is_none()
    }
}

/// What a cached like refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum LikeTarget {
    Post(RemoteId),
    Comment(RemoteId),
}

/// A user who liked a post or comment, cached from the last like-list fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLikeUser {
    pub id: ObjectId,
    pub user_id: RemoteId,
    pub site_id: RemoteId,
    pub target: LikeTarget,
    /// Last time the like list containing this user was refreshed
    pub date_fetched: DateTime<Utc>,
}

impl CachedLikeUser {
    pub fn new(
        user_id: RemoteId,
        site_id: RemoteId,
        target: LikeTarget,
        date_fetched: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            site_id,
            target,
            date_fetched,
        }
    }

    /// `(user, site, post or comment)` identity of the cached like.
    pub fn composite_key(&self) -> (RemoteId, RemoteId, LikeTarget) {
        (self.user_id, self.site_id, self.target)
    }
}

/// A stored row of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Row {
    Account(Account),
    Blog(Blog),
    Post(Post),
    CachedLikeUser(CachedLikeUser),
}

impl Row {
    pub fn kind(&self) -> EntityKind {
        match self {
            Row::Account(_) => EntityKind::Account,
            Row::Blog(_) => EntityKind::Blog,
            Row::Post(_) => EntityKind::Post,
            Row::CachedLikeUser(_) => EntityKind::CachedLikeUser,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        match self {
            Row::Account(a) => a.id,
            Row::Blog(b) => b.id,
            Row::Post(p) => p.id,
            Row::CachedLikeUser(u) => u.id,
        }
    }

    pub fn key(&self) -> RowKey {
        (self.kind(), self.object_id())
    }

    /// The row this one belongs to, if any. Deleting the parent cascades.
    pub fn parent(&self) -> Option<RowKey> {
        match self {
            Row::Blog(b) => b.account_id.map(|id| (EntityKind::Account, id)),
            Row::Post(p) => Some((EntityKind::Blog, p.blog_id)),
            Row::Account(_) | Row::CachedLikeUser(_) => None,
        }
    }
}

/// A typed view over [`Row`] used by the generic transaction API.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn object_id(&self) -> ObjectId;
    fn set_object_id(&mut self, id: ObjectId);
    fn into_row(self) -> Row;
    fn from_row(row: &Row) -> Option<&Self>;
}

macro_rules! impl_entity {
    ($ty:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn object_id(&self) -> ObjectId {
                self.id
            }

            fn set_object_id(&mut self, id: ObjectId) {
                self.id = id;
            }

            fn into_row(self) -> Row {
                Row::$ty(self)
            }

            fn from_row(row: &Row) -> Option<&Self> {
                match row {
                    Row::$ty(entity) => Some(entity),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(Account);
impl_entity!(Blog);
impl_entity!(Post);
impl_entity!(CachedLikeUser);
