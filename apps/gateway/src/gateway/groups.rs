//! Group membership cache.
//!
//! A read-through copy of the group directory used for routing. The whole
//! snapshot is rebuilt from a full directory listing and swapped in at once,
//! so readers see either the old membership or the new one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use parley_common::{GroupId, IdentityId};
use serde::{Deserialize, Serialize};

use crate::directory::{GroupRecord, UserRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: IdentityId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedGroup {
    pub id: GroupId,
    pub name: String,
    /// In directory order, without duplicates.
    pub members: Vec<Member>,
}

impl CachedGroup {
    /// `name (alice, bob)`, as shown in client group lists.
    pub fn rendered_name(&self) -> String {
        let names: Vec<&str> = self.members.iter().map(|m| m.display_name.as_str()).collect();
        format!("{} ({})", self.name, names.join(", "))
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id.clone(),
            name: self.rendered_name(),
        }
    }
}

/// Group entry of a list snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
}

/// One complete, immutable copy of group membership.
#[derive(Debug, Clone, Default)]
pub struct GroupSnapshot {
    /// Directory order.
    groups: Vec<CachedGroup>,
    index: HashMap<GroupId, usize>,
}

impl GroupSnapshot {
    /// Resolve member ids to display names from `users`. A member the identity
    /// directory doesn't know keeps its id as its name.
    pub fn build(records: Vec<GroupRecord>, users: &[UserRecord]) -> Self {
        let names: HashMap<&IdentityId, &str> = users
            .iter()
            .map(|u| (&u.id, u.display_name.as_str()))
            .collect();

        let mut groups = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());

        for record in records {
            let mut members: Vec<Member> = Vec::with_capacity(record.member_ids.len());
            for id in record.member_ids {
                if members.iter().any(|m| m.id == id) {
                    continue;
                }
                let display_name = names
                    .get(&id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| id.to_string());
                members.push(Member { id, display_name });
            }

            // Later duplicates of a group id replace earlier ones.
            let group = CachedGroup {
                id: record.id,
                name: record.name,
                members,
            };
            match index.get(&group.id) {
                Some(&pos) => groups[pos] = group,
                None => {
                    index.insert(group.id.clone(), groups.len());
                    groups.push(group);
                }
            }
        }

        Self { groups, index }
    }

    pub fn get(&self, group_id: &GroupId) -> Option<&CachedGroup> {
        self.index.get(group_id).map(|&pos| &self.groups[pos])
    }

    /// Members in directory order; empty for an unknown group.
    pub fn members_of(&self, group_id: &GroupId) -> &[Member] {
        self.get(group_id).map(|g| g.members.as_slice()).unwrap_or(&[])
    }

    pub fn is_member(&self, group_id: &GroupId, identity_id: &IdentityId) -> bool {
        self.members_of(group_id).iter().any(|m| &m.id == identity_id)
    }

    /// Every group `identity_id` belongs to, in directory order.
    pub fn groups_containing<'a>(
        &'a self,
        identity_id: &'a IdentityId,
    ) -> impl Iterator<Item = &'a CachedGroup> + 'a {
        self.groups
            .iter()
            .filter(move |g| g.members.iter().any(|m| &m.id == identity_id))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Shared cache holding the current [`GroupSnapshot`].
///
/// Refreshes are tagged with a generation so a slow refresh that started
/// earlier can never overwrite one that started later.
pub struct GroupCache {
    current: RwLock<Arc<GroupSnapshot>>,
    started: AtomicU64,
    installed: Mutex<u64>,
}

impl GroupCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(GroupSnapshot::default())),
            started: AtomicU64::new(0),
            installed: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<GroupSnapshot> {
        self.current.read().clone()
    }

    /// Tag a refresh before its directory reads are issued.
    pub fn begin_refresh(&self) -> u64 {
        self.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install `snapshot` unless a newer refresh already landed.
    pub fn install(&self, generation: u64, snapshot: GroupSnapshot) -> bool {
        let mut installed = self.installed.lock();
        if generation <= *installed {
            tracing::debug!(generation, latest = *installed, "discarding stale group refresh");
            return false;
        }
        *installed = generation;
        *self.current.write() = Arc::new(snapshot);
        true
    }
}

impl Default for GroupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> UserRecord {
        UserRecord {
            id: IdentityId::new(id),
            display_name: name.to_string(),
            online: true,
        }
    }

    fn group(id: &str, name: &str, members: &[&str]) -> GroupRecord {
        GroupRecord {
            id: GroupId::new(id),
            name: name.to_string(),
            member_ids: members.iter().map(|m| IdentityId::new(*m)).collect(),
        }
    }

    fn users() -> Vec<UserRecord> {
        vec![user("a", "alice"), user("b", "bob"), user("c", "carol")]
    }

    #[test]
    fn build_resolves_names_and_renders() {
        let snap = GroupSnapshot::build(vec![group("g1", "team", &["a", "b"])], &users());
        let g = snap.get(&GroupId::new("g1")).unwrap();
        assert_eq!(g.rendered_name(), "team (alice, bob)");
        assert_eq!(
            g.summary(),
            GroupSummary {
                id: GroupId::new("g1"),
                name: "team (alice, bob)".to_string()
            }
        );
    }

    #[test]
    fn unknown_members_fall_back_to_their_id() {
        let snap = GroupSnapshot::build(vec![group("g1", "team", &["a", "zed"])], &users());
        let names: Vec<_> = snap
            .members_of(&GroupId::new("g1"))
            .iter()
            .map(|m| m.display_name.as_str())
            .collect();
        assert_eq!(names, ["alice", "zed"]);
    }

    #[test]
    fn duplicate_member_ids_collapse() {
        let snap = GroupSnapshot::build(vec![group("g1", "team", &["a", "b", "a"])], &users());
        assert_eq!(snap.members_of(&GroupId::new("g1")).len(), 2);
    }

    #[test]
    fn membership_queries() {
        let snap = GroupSnapshot::build(
            vec![
                group("g1", "one", &["a", "b"]),
                group("g2", "two", &["b", "c"]),
            ],
            &users(),
        );
        assert!(snap.is_member(&GroupId::new("g1"), &IdentityId::new("a")));
        assert!(!snap.is_member(&GroupId::new("g1"), &IdentityId::new("c")));
        assert!(!snap.is_member(&GroupId::new("nope"), &IdentityId::new("a")));
        assert!(snap.members_of(&GroupId::new("nope")).is_empty());

        let bob = IdentityId::new("b");
        let ids: Vec<_> = snap.groups_containing(&bob).map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["g1", "g2"]);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn install_replaces_the_whole_snapshot() {
        let cache = GroupCache::new();
        assert!(cache.snapshot().is_empty());

        let g = cache.begin_refresh();
        assert!(cache.install(g, GroupSnapshot::build(vec![group("g1", "one", &["a"])], &users())));
        let before = cache.snapshot();

        let g = cache.begin_refresh();
        assert!(cache.install(g, GroupSnapshot::build(vec![group("g2", "two", &["b"])], &users())));

        // Old readers keep their snapshot; new readers only see the new one.
        assert!(before.get(&GroupId::new("g1")).is_some());
        let after = cache.snapshot();
        assert!(after.get(&GroupId::new("g1")).is_none());
        assert!(after.get(&GroupId::new("g2")).is_some());
    }

    #[test]
    fn stale_refresh_is_discarded() {
        let cache = GroupCache::new();
        let slow = cache.begin_refresh();
        let fast = cache.begin_refresh();

        let newer = GroupSnapshot::build(vec![group("new", "n", &["a"])], &users());
        let older = GroupSnapshot::build(vec![group("old", "o", &["a"])], &users());
        assert!(cache.install(fast, newer));
        assert!(!cache.install(slow, older));
        assert!(cache.snapshot().get(&GroupId::new("new")).is_some());
    }
}
