//! Per-connection outbound queues.
//!
//! Every connection owns one unbounded queue drained by its own event loop.
//! All emissions to a connection go through that queue, so two events pushed
//! in order by one task reach the socket in that order.

use parley_common::ConnectionId;
use tokio::sync::mpsc;

use super::events::Event;

/// Cloneable sending side of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Event>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue an event. Returns `false` when the connection is already gone.
    pub fn deliver(&self, event: Event) -> bool {
        match self.sender.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(connection_id = %self.id, "dropping event for closed connection");
                false
            }
        }
    }
}
