use std::sync::Arc;
use std::time::Duration;

use parley_common::{GroupId, IdentityId};

use super::{bounded, DirectoryError, GroupDirectory, GroupRecord};

/// Timeout-bounded access to the group directory, the sole source of group
/// truth.
#[derive(Clone)]
pub struct GroupDirectoryClient {
    backend: Arc<dyn GroupDirectory>,
    timeout: Duration,
}

impl GroupDirectoryClient {
    pub fn new(backend: Arc<dyn GroupDirectory>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn create(
        &self,
        name: &str,
        member_ids: &[IdentityId],
    ) -> Result<GroupId, DirectoryError> {
        bounded(
            "create_group",
            self.timeout,
            self.backend.create_group(name, member_ids),
        )
        .await
    }

    pub async fn list_all(&self) -> Result<Vec<GroupRecord>, DirectoryError> {
        bounded("list_groups", self.timeout, self.backend.list_groups()).await
    }
}
