use std::sync::Arc;
use std::time::Duration;

use parley_common::IdentityId;

use super::{bounded, DirectoryError, IdentityDirectory, UserRecord};

/// Timeout-bounded access to the identity directory.
#[derive(Clone)]
pub struct IdentityDirectoryClient {
    backend: Arc<dyn IdentityDirectory>,
    timeout: Duration,
}

impl IdentityDirectoryClient {
    pub fn new(backend: Arc<dyn IdentityDirectory>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Reuse `claimed_id` when the directory knows it under `display_name`,
    /// otherwise register a fresh identity.
    ///
    /// A claim whose name does not match is ignored rather than rejected: the
    /// client simply gets a new identity.
    pub async fn resolve_or_register(
        &self,
        display_name: &str,
        claimed_id: Option<&IdentityId>,
    ) -> Result<IdentityId, DirectoryError> {
        if let Some(claimed) = claimed_id {
            let users = self.list_all().await?;
            let matches = users
                .iter()
                .any(|u| &u.id == claimed && u.display_name == display_name);
            if matches {
                tracing::debug!(identity_id = %claimed, display_name, "reusing claimed identity");
                return Ok(claimed.clone());
            }
            tracing::debug!(
                claimed_id = %claimed,
                display_name,
                "claimed identity not found under this name; registering fresh"
            );
        }

        let id = bounded(
            "register_user",
            self.timeout,
            self.backend.register_user(display_name),
        )
        .await?;
        tracing::info!(identity_id = %id, display_name, "registered new identity");
        Ok(id)
    }

    /// Fresh listing of every identity. Never cached.
    pub async fn list_all(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        bounded("list_users", self.timeout, self.backend.list_users()).await
    }

    pub async fn set_status(&self, id: &IdentityId, online: bool) -> Result<bool, DirectoryError> {
        bounded("set_status", self.timeout, self.backend.set_status(id, online)).await
    }
}
