//! In-process directories for local runs and tests.
//!
//! Both keep records in insertion order, like the reference services, and
//! can be switched unavailable or slowed down to exercise failure paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_common::{GroupId, IdentityId, PrefixedId};

use super::{DirectoryError, GroupDirectory, GroupRecord, IdentityDirectory, UserRecord};

/// Availability switch and injected latency shared by both directories.
struct Faults {
    available: AtomicBool,
    latency: Mutex<Duration>,
}

impl Faults {
    fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    async fn check(&self, operation: &'static str) -> Result<(), DirectoryError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Transport {
                operation,
                message: "directory unreachable".to_string(),
            })
        }
    }
}

pub struct MemoryIdentityDirectory {
    users: Mutex<Vec<UserRecord>>,
    faults: Faults,
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            faults: Faults::new(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.faults.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.faults.latency.lock() = latency;
    }

    /// Current `online` flag of an identity, if known.
    pub fn is_online(&self, id: &IdentityId) -> Option<bool> {
        self.users.lock().iter().find(|u| &u.id == id).map(|u| u.online)
    }
}

impl Default for MemoryIdentityDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryIdentityDirectory {
    async fn register_user(&self, display_name: &str) -> Result<IdentityId, DirectoryError> {
        self.faults.check("register_user").await?;
        let id = IdentityId::generate();
        self.users.lock().push(UserRecord {
            id: id.clone(),
            display_name: display_name.to_string(),
            online: true,
        });
        Ok(id)
    }

    async fn set_status(&self, id: &IdentityId, online: bool) -> Result<bool, DirectoryError> {
        self.faults.check("set_status").await?;
        let mut users = self.users.lock();
        match users.iter_mut().find(|u| &u.id == id) {
            Some(user) => {
                user.online = online;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        self.faults.check("list_users").await?;
        Ok(self.users.lock().clone())
    }
}

pub struct MemoryGroupDirectory {
    groups: Mutex<Vec<GroupRecord>>,
    faults: Faults,
}

impl MemoryGroupDirectory {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(Vec::new()),
            faults: Faults::new(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.faults.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.faults.latency.lock() = latency;
    }
}

impl Default for MemoryGroupDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupDirectory for MemoryGroupDirectory {
    async fn create_group(
        &self,
        name: &str,
        member_ids: &[IdentityId],
    ) -> Result<GroupId, DirectoryError> {
        self.faults.check("create_group").await?;
        let id = GroupId::generate();
        self.groups.lock().push(GroupRecord {
            id: id.clone(),
            name: name.to_string(),
            member_ids: member_ids.to_vec(),
        });
        Ok(id)
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, DirectoryError> {
        self.faults.check("list_groups").await?;
        Ok(self.groups.lock().clone())
    }
}
