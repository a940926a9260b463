//! Adapters to the identity and group directory services.
//!
//! The directories own all durable state. The gateway only ever talks to
//! them through the [`IdentityDirectory`] and [`GroupDirectory`] traits,
//! wrapped by clients that bound every call with a timeout.

pub mod group;
pub mod http;
pub mod identity;
pub mod memory;
pub mod stub;
pub(crate) mod wire;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parley_common::{GroupId, IdentityId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use group::GroupDirectoryClient;
pub use identity::IdentityDirectoryClient;

/// One account as listed by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: IdentityId,
    pub display_name: String,
    pub online: bool,
}

/// One group as listed by the group directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    pub member_ids: Vec<IdentityId>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} returned status {status}")]
    Status { operation: &'static str, status: u16 },
    #[error("{operation} returned an unreadable body")]
    Decode { operation: &'static str },
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn register_user(&self, display_name: &str) -> Result<IdentityId, DirectoryError>;
    /// Returns the directory's `success` flag; `false` means the id is unknown.
    async fn set_status(&self, id: &IdentityId, online: bool) -> Result<bool, DirectoryError>;
    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError>;
}

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn create_group(
        &self,
        name: &str,
        member_ids: &[IdentityId],
    ) -> Result<GroupId, DirectoryError>;
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, DirectoryError>;
}

/// Run a directory call, failing with [`DirectoryError::Timeout`] once `limit`
/// elapses.
pub(crate) async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, DirectoryError>>,
) -> Result<T, DirectoryError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "directory call timed out"
            );
            Err(DirectoryError::Timeout { operation })
        }
    }
}
