//! Full-snapshot list synchronisation.

use parley_common::IdentityId;

use crate::directory::UserRecord;

use super::events::{Event, ListSnapshot};
use super::groups::GroupSnapshot;
use super::hub::Hub;

/// Lists visible to `identity_id`: every known identity, including itself,
/// and only the groups it belongs to.
pub fn snapshot_for(
    identity_id: &IdentityId,
    users: &[UserRecord],
    groups: &GroupSnapshot,
) -> ListSnapshot {
    ListSnapshot {
        users: users.to_vec(),
        groups: groups
            .groups_containing(identity_id)
            .map(|g| g.summary())
            .collect(),
    }
}

impl Hub {
    /// Push a fresh `LIST_SNAPSHOT` to every identity's live connection.
    ///
    /// `users` is the listing fetched by the refresh that preceded this push.
    pub fn push_snapshots(&self, users: &[UserRecord]) -> usize {
        let view = self.sessions.view();
        let groups = self.groups.snapshot();

        let mut pushed = 0;
        for (identity_id, handle) in view.live() {
            let snapshot = snapshot_for(identity_id, users, &groups);
            if handle.deliver(Event::ListSnapshot(snapshot)) {
                pushed += 1;
            }
        }
        tracing::debug!(pushed, "list snapshots pushed");
        pushed
    }
}
