//! Grouping entities by remote identity.

use crate::RemoteId;
use std::collections::HashMap;

/// Entities sharing one remote identity, in their original relative order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityGroup<T> {
    pub key: RemoteId,
    pub members: Vec<T>,
}

impl<T> IdentityGroup<T> {
    /// More than one local record claims this identity.
    pub fn is_duplicate(&self) -> bool {
        self.members.len() > 1
    }
}

/// Output of [`group_by_identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping<T> {
    /// Groups in order of each key's first appearance
    pub groups: Vec<IdentityGroup<T>>,
    /// Entities with no identity; never part of any group
    pub without_identity: Vec<T>,
}

impl<T> Grouping<T> {
    /// Groups with more than one member.
    pub fn duplicates(self) -> impl Iterator<Item = IdentityGroup<T>> {
        self.groups.into_iter().filter(IdentityGroup::is_duplicate)
    }
}

/// Group `items` by the identity `key` extracts.
///
/// `key` returns `None` for entities without a remote identity. Group order
/// and member order both follow the input order, so the result is stable for
/// a given input sequence.
pub fn group_by_identity<T, I, K>(items: I, key: K) -> Grouping<T>
where
    I: IntoIterator<Item = T>,
    K: Fn(&T) -> Option<RemoteId>,
{
    let mut index: HashMap<RemoteId, usize> = HashMap::new();
    let mut groups: Vec<IdentityGroup<T>> = Vec::new();
    let mut without_identity = Vec::new();

    for item in items {
        let Some(id) = key(&item) else {
            without_identity.push(item);
            continue;
        };
        match index.get(&id) {
            Some(&slot) => groups[slot].members.push(item),
            None => {
                index.insert(id, groups.len());
                groups.push(IdentityGroup {
                    key: id,
                    members: vec![item],
                });
            }
        }
    }

    Grouping {
        groups,
        without_identity,
    }
}
