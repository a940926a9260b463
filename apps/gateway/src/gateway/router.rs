//! Message routing for direct and group sends.
//!
//! Routing is synchronous: it reads one session view and one group snapshot
//! and pushes onto recipients' outbound queues. Each recipient gets a
//! `CONVERSATION_STARTED` immediately followed by the `MESSAGE_RECEIVED`.

use chrono::Utc;
use parley_common::{ConnectionId, GroupId, IdentityId};

use crate::error::GatewayError;

use super::conversation::ConversationKey;
use super::events::{ConversationStarted, Event, MessageReceived};
use super::fanout::ConnectionHandle;
use super::hub::Hub;
use super::registry::BoundIdentity;

impl Hub {
    /// Route `body` from the identity bound to `sender` to `recipient`.
    ///
    /// Returns the number of connections reached: `0` when the recipient is
    /// offline, which is not an error.
    pub fn send_direct(
        &self,
        sender: &ConnectionId,
        recipient: &IdentityId,
        body: String,
    ) -> Result<usize, GatewayError> {
        let view = self.sessions.view();
        let from = view.identity_of(sender).ok_or(GatewayError::Unbound)?;
        let conversation = ConversationKey::direct(&from.identity_id, recipient);

        let Some(target) = view.lookup_connection(recipient) else {
            tracing::debug!(
                connection_id = %sender,
                recipient = %recipient,
                "recipient offline; direct message dropped"
            );
            return Ok(0);
        };
        if target.id() == sender {
            return Ok(0);
        }

        let message = self.compose(from, conversation, body);
        let delivered = usize::from(deliver(target, &message));
        tracing::debug!(conversation = %message.conversation, delivered, "direct message routed");
        Ok(delivered)
    }

    /// Route `body` to every live member of `group_id`.
    ///
    /// A sender outside the group gets `Forbidden` back; callers log it and
    /// must not surface it to the client. The sending connection itself is
    /// never a target, but the sender identity's live connection is when it
    /// is a different connection.
    pub fn send_group(
        &self,
        sender: &ConnectionId,
        group_id: &GroupId,
        body: String,
    ) -> Result<usize, GatewayError> {
        let view = self.sessions.view();
        let from = view.identity_of(sender).ok_or(GatewayError::Unbound)?;
        let groups = self.groups.snapshot();

        if !groups.is_member(group_id, &from.identity_id) {
            tracing::warn!(
                connection_id = %sender,
                identity_id = %from.identity_id,
                group_id = %group_id,
                "group send from non-member dropped"
            );
            return Err(GatewayError::Forbidden(group_id.clone()));
        }

        let message = self.compose(from, ConversationKey::group(group_id.clone()), body);
        let mut delivered = 0;
        for member in groups.members_of(group_id) {
            let Some(target) = view.lookup_connection(&member.id) else {
                continue;
            };
            if target.id() != sender && deliver(target, &message) {
                delivered += 1;
            }
        }

        tracing::debug!(conversation = %message.conversation, delivered, "group message routed");
        Ok(delivered)
    }

    fn compose(
        &self,
        from: &BoundIdentity,
        conversation: ConversationKey,
        body: String,
    ) -> MessageReceived {
        MessageReceived {
            message_id: self.next_message_id(),
            from_id: from.identity_id.clone(),
            from_display_name: from.display_name.clone(),
            body,
            conversation,
            sent_at: Utc::now(),
        }
    }
}

fn deliver(target: &ConnectionHandle, message: &MessageReceived) -> bool {
    let started = Event::ConversationStarted(ConversationStarted {
        conversation: message.conversation.clone(),
    });
    target.deliver(started) && target.deliver(Event::MessageReceived(message.clone()))
}
