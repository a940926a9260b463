//! Per-connection gateway session state.
//!
//! `Unbound -> Binding -> Bound -> Closed`. `Closed` is terminal and reachable
//! from every state. The state is shared between the connection's event loop
//! and any registration task it spawned, so transitions that also touch the
//! session table run under the session lock.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use parley_common::{ConnectionId, IdentityId};

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    /// A registration request is in flight.
    Binding,
    Bound(IdentityId),
    Closed,
}

/// State for a single WebSocket connection.
pub struct GatewaySession {
    pub connection_id: ConnectionId,
    state: Mutex<ConnectionState>,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            state: Mutex::new(ConnectionState::Unbound),
            seq: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// `Unbound -> Binding`.
    pub fn begin_binding(&self) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        match &*state {
            ConnectionState::Unbound => {}
            ConnectionState::Binding | ConnectionState::Bound(_) => {
                return Err(GatewayError::AlreadyBound)
            }
            ConnectionState::Closed => return Err(GatewayError::Unbound),
        }
        *state = ConnectionState::Binding;
        Ok(())
    }

    /// Run `install` while the session is still `Binding`.
    ///
    /// Fails with `Unbound` once the connection has closed, in which case
    /// `install` is not called.
    pub fn while_binding<T>(&self, install: impl FnOnce() -> T) -> Result<T, GatewayError> {
        let state = self.state.lock();
        if *state != ConnectionState::Binding {
            return Err(GatewayError::Unbound);
        }
        Ok(install())
    }

    /// `Binding -> Bound`.
    pub fn complete_binding(&self, identity_id: IdentityId) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if *state != ConnectionState::Binding {
            return Err(GatewayError::Unbound);
        }
        *state = ConnectionState::Bound(identity_id);
        Ok(())
    }

    /// `Binding -> Unbound` after a failed registration. No-op otherwise.
    pub fn abort_binding(&self) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Binding {
            *state = ConnectionState::Unbound;
        }
    }

    /// The bound identity, or `Unbound` for every other state.
    pub fn ensure_bound(&self) -> Result<IdentityId, GatewayError> {
        match &*self.state.lock() {
            ConnectionState::Bound(id) => Ok(id.clone()),
            _ => Err(GatewayError::Unbound),
        }
    }

    /// Move to `Closed` and run `release` under the same lock, so no
    /// registration can install a binding after it.
    pub fn close<T>(&self, release: impl FnOnce() -> T) -> T {
        let mut state = self.state.lock();
        *state = ConnectionState::Closed;
        release()
    }
}
