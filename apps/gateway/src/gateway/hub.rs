//! The gateway's shared state and the directory clients that feed it.

use parley_common::{MessageId, SnowflakeGenerator};

use crate::directory::{DirectoryError, GroupDirectoryClient, IdentityDirectoryClient, UserRecord};

use super::groups::{GroupCache, GroupSnapshot};
use super::registry::SessionTable;

/// Owner of the session table and the group membership cache.
///
/// Every piece of shared mutable state in the gateway hangs off this struct;
/// connection tasks only reach it through an `Arc<Hub>`.
pub struct Hub {
    pub sessions: SessionTable,
    pub groups: GroupCache,
    pub identities: IdentityDirectoryClient,
    pub group_directory: GroupDirectoryClient,
    message_ids: SnowflakeGenerator,
}

impl Hub {
    pub fn new(identities: IdentityDirectoryClient, group_directory: GroupDirectoryClient) -> Self {
        Self {
            sessions: SessionTable::new(),
            groups: GroupCache::new(),
            identities,
            group_directory,
            message_ids: SnowflakeGenerator::new(0),
        }
    }

    pub fn next_message_id(&self) -> MessageId {
        self.message_ids.next_id()
    }

    /// Reload the group cache from both directories.
    ///
    /// Returns the fresh user listing for the caller's snapshot. When the
    /// identity directory fails nothing is replaced. When only the group
    /// directory fails the cache keeps its last good state and the users are
    /// still returned.
    pub async fn refresh_groups(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let generation = self.groups.begin_refresh();
        let (users, groups) = tokio::join!(
            self.identities.list_all(),
            self.group_directory.list_all()
        );

        let users = users.inspect_err(|error| {
            tracing::warn!(%error, "user listing failed; group cache left as is");
        })?;

        match groups {
            Ok(records) => {
                let snapshot = GroupSnapshot::build(records, &users);
                let count = snapshot.len();
                if self.groups.install(generation, snapshot) {
                    tracing::debug!(generation, groups = count, "group cache refreshed");
                }
            }
            Err(error) => {
                tracing::warn!(%error, "group listing failed; serving cached membership");
            }
        }

        Ok(users)
    }
}
