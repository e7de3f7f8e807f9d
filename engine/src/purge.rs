//! Expiry of cached like users.
//!
//! Like lists are re-fetched whenever they are shown, so cached entries older
//! than the retention window carry no information worth keeping.

use crate::{
    error::{Error, Result},
    CachedLikeUser, Entity, ObjectId, Transaction,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Default age after which cached like users are purged.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Longest retention window accepted from configuration or the host.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// How long cached like users are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: TimeDelta,
}

impl RetentionPolicy {
    /// A window of `days` days, between zero and [`MAX_RETENTION_DAYS`].
    pub fn try_days(days: i64) -> Result<Self> {
        TimeDelta::try_days(days)
            .filter(|_| (0..=MAX_RETENTION_DAYS).contains(&days))
            .map(|max_age| Self { max_age })
            .ok_or(Error::RetentionOutOfRange { days })
    }

    /// Entries fetched strictly before this instant are stale.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_sub_signed(self.max_age)
            .ok_or(Error::RetentionOutOfRange {
                days: self.max_age.num_days(),
            })
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: TimeDelta::days(DEFAULT_RETENTION_DAYS),
        }
    }
}

/// Result of a purge pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    /// Deleted cached like users
    pub purged: Vec<ObjectId>,
    pub cutoff: DateTime<Utc>,
    pub committed: bool,
}

/// Delete every cached like user fetched more than `retention` before `now`.
///
/// An entry fetched exactly `retention` ago is kept. The deletions are
/// committed together; on error nothing is deleted. A window reaching past
/// the earliest representable time is [`Error::RetentionOutOfRange`].
pub fn purge_stale_cached_users<T: Transaction>(
    mut tx: T,
    retention: TimeDelta,
    now: DateTime<Utc>,
) -> Result<PurgeReport> {
    let cutoff = RetentionPolicy { max_age: retention }.cutoff(now)?;
    let stale = tx.fetch(|user: &CachedLikeUser| user.date_fetched < cutoff)?;

    let mut purged = Vec::with_capacity(stale.len());
    for user in stale {
        tx.delete::<CachedLikeUser>(user.object_id())?;
        purged.push(user.id);
    }

    let committed = tx.has_pending_changes();
    if committed {
        tx.commit()?;
        tracing::info!(purged = purged.len(), %cutoff, "purged stale cached like users");
    }

    Ok(PurgeReport {
        purged,
        cutoff,
        committed,
    })
}
