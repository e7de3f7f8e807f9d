//! Choosing which duplicate survives a merge.
//!
//! Selection is a pure function over [`Candidate`] views so it can be tested
//! without a store. Precedence, first match wins:
//!
//! 1. the default account
//! 2. the first blog holding local drafts
//! 3. the first member in original order

use crate::ObjectId;
use serde::{Deserialize, Serialize};

/// What the selector needs to know about one member of a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: ObjectId,
    /// Member is the current default account
    pub is_default: bool,
    /// Member owns unsynced local drafts
    pub has_local_drafts: bool,
}

impl Candidate {
    /// An account candidate. `default_account` comes from an explicit query,
    /// not from the account row itself.
    pub fn account(id: ObjectId, default_account: Option<ObjectId>) -> Self {
        Self {
            id,
            is_default: default_account == Some(id),
            has_local_drafts: false,
        }
    }

    pub fn blog(id: ObjectId, has_local_drafts: bool) -> Self {
        Self {
            id,
            is_default: false,
            has_local_drafts,
        }
    }
}

/// The rule that picked a survivor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurvivorRule {
    DefaultAccount,
    LocalDrafts,
    FirstSeen,
}

/// Position of the survivor within the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub rule: SurvivorRule,
}

/// Pick the survivor of a duplicate group.
///
/// Returns `None` only for an empty group.
pub fn select_survivor(candidates: &[Candidate]) -> Option<Selection> {
    if candidates.is_empty() {
        return None;
    }

    let by_rule = |rule: SurvivorRule, matches: fn(&Candidate) -> bool| {
        candidates
            .iter()
            .position(matches)
            .map(|index| Selection { index, rule })
    };

    by_rule(SurvivorRule::DefaultAccount, |c: &Candidate| c.is_default)
        .or_else(|| by_rule(SurvivorRule::LocalDrafts, |c: &Candidate| c.has_local_drafts))
        .or(Some(Selection {
            index: 0,
            rule: SurvivorRule::FirstSeen,
        }))
}
