//! Session table: the live connection <-> identity mapping.
//!
//! Both directions live in one immutable [`SessionView`]. Writers clone the
//! current view, edit the clone and swap it in under the write lock, so a
//! reader holding a view never sees one direction updated without the other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use parley_common::{ConnectionId, IdentityId};

use super::fanout::ConnectionHandle;

/// Identity a connection is bound to, with the name it registered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundIdentity {
    pub identity_id: IdentityId,
    pub display_name: String,
}

/// Result of removing a connection from the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    pub identity: BoundIdentity,
    /// `false` when the connection had already been superseded by a newer one.
    pub was_current: bool,
}

/// Immutable snapshot of every binding.
///
/// `by_identity` holds one live connection per identity (last connect wins).
/// `by_connection` may hold several connections for one identity: a
/// superseded connection keeps its own entry until it closes.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    by_identity: HashMap<IdentityId, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, BoundIdentity>,
}

impl SessionView {
    /// `None` means offline.
    pub fn lookup_connection(&self, identity_id: &IdentityId) -> Option<&ConnectionHandle> {
        self.by_identity.get(identity_id)
    }

    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<&BoundIdentity> {
        self.by_connection.get(connection_id)
    }

    /// Every identity with a live connection, and that connection.
    pub fn live(&self) -> impl Iterator<Item = (&IdentityId, &ConnectionHandle)> {
        self.by_identity.iter()
    }

    pub fn live_count(&self) -> usize {
        self.by_identity.len()
    }
}

/// Shared session table. All access goes through the narrow API below.
pub struct SessionTable {
    current: RwLock<Arc<SessionView>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(SessionView::default())),
        }
    }

    /// Consistent view of the whole table.
    pub fn view(&self) -> Arc<SessionView> {
        self.current.read().clone()
    }

    /// Install `connection -> identity` and `identity -> connection`.
    ///
    /// A previous live connection for the same identity is silently
    /// superseded; its id is returned for logging.
    pub fn bind(&self, handle: ConnectionHandle, identity: BoundIdentity) -> Option<ConnectionId> {
        let mut guard = self.current.write();
        let mut next = SessionView::clone(&guard);

        next.by_connection.insert(handle.id().clone(), identity.clone());
        let superseded = next
            .by_identity
            .insert(identity.identity_id.clone(), handle)
            .map(|old| old.id().clone());

        *guard = Arc::new(next);
        superseded
    }

    pub fn lookup_connection(&self, identity_id: &IdentityId) -> Option<ConnectionHandle> {
        self.current.read().lookup_connection(identity_id).cloned()
    }

    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<BoundIdentity> {
        self.current.read().identity_of(connection_id).cloned()
    }

    /// Remove whatever binding `connection_id` holds.
    ///
    /// The identity direction is only cleared when it still points at this
    /// connection, so a superseded connection closing never takes its
    /// successor offline.
    pub fn unbind(&self, connection_id: &ConnectionId) -> Option<Released> {
        let mut guard = self.current.write();
        if !guard.by_connection.contains_key(connection_id) {
            return None;
        }

        let mut next = SessionView::clone(&guard);
        let identity = next.by_connection.remove(connection_id)?;
        let was_current = next
            .by_identity
            .get(&identity.identity_id)
            .is_some_and(|h| h.id() == connection_id);
        if was_current {
            next.by_identity.remove(&identity.identity_id);
        }

        *guard = Arc::new(next);
        Some(Released {
            identity,
            was_current,
        })
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
