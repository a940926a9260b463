//! Gateway opcodes, event types, and wire-format messages.

use chrono::{DateTime, Utc};
use parley_common::{ConnectionId, GroupId, IdentityId, MessageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::directory::UserRecord;
use crate::error::GatewayError;

use super::conversation::ConversationKey;
use super::groups::GroupSummary;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_REGISTER: u8 = 2;
pub const OP_SEND_DIRECT: u8 = 3;
pub const OP_SEND_GROUP: u8 = 4;
pub const OP_CREATE_GROUP: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;
pub const OP_HELLO: u8 = 10;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a HELLO message (op=10), the first frame on every connection.
    pub fn hello(connection_id: &ConnectionId, heartbeat_interval_ms: u64) -> Self {
        Self {
            op: OP_HELLO,
            t: None,
            s: None,
            d: serde_json::json!({
                "connection_id": connection_id,
                "heartbeat_interval": heartbeat_interval_ms,
            }),
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPayload {
    pub display_name: String,
    #[serde(default)]
    pub claimed_id: Option<IdentityId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendDirectPayload {
    pub to: IdentityId,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendGroupPayload {
    pub group_id: GroupId,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupPayload {
    pub name: String,
    pub member_ids: Vec<IdentityId>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Dispatch events
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const REGISTRATION_CONFIRMED: &'static str = "REGISTRATION_CONFIRMED";
    pub const LIST_SNAPSHOT: &'static str = "LIST_SNAPSHOT";
    pub const CONVERSATION_STARTED: &'static str = "CONVERSATION_STARTED";
    pub const MESSAGE_RECEIVED: &'static str = "MESSAGE_RECEIVED";
    pub const REQUEST_REJECTED: &'static str = "REQUEST_REJECTED";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfirmed {
    pub id: IdentityId,
}

/// Full replacement of a client's visible lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub users: Vec<UserRecord>,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationStarted {
    pub conversation: ConversationKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceived {
    pub message_id: MessageId,
    pub from_id: IdentityId,
    pub from_display_name: String,
    pub body: String,
    pub conversation: ConversationKey,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRejected {
    /// Opcode of the request being rejected.
    pub op: u8,
    pub code: String,
    pub message: String,
}

impl RequestRejected {
    pub fn new(op: u8, err: &GatewayError) -> Self {
        Self {
            op,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Everything the gateway can push to a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RegistrationConfirmed(RegistrationConfirmed),
    ListSnapshot(ListSnapshot),
    ConversationStarted(ConversationStarted),
    MessageReceived(MessageReceived),
    RequestRejected(RequestRejected),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegistrationConfirmed(_) => EventName::REGISTRATION_CONFIRMED,
            Self::ListSnapshot(_) => EventName::LIST_SNAPSHOT,
            Self::ConversationStarted(_) => EventName::CONVERSATION_STARTED,
            Self::MessageReceived(_) => EventName::MESSAGE_RECEIVED,
            Self::RequestRejected(_) => EventName::REQUEST_REJECTED,
        }
    }

    pub fn data(&self) -> Value {
        let data = match self {
            Self::RegistrationConfirmed(d) => serde_json::to_value(d),
            Self::ListSnapshot(d) => serde_json::to_value(d),
            Self::ConversationStarted(d) => serde_json::to_value(d),
            Self::MessageReceived(d) => serde_json::to_value(d),
            Self::RequestRejected(d) => serde_json::to_value(d),
        };
        data.unwrap_or_default()
    }

    pub fn into_dispatch(self, seq: u64) -> GatewayMessage {
        GatewayMessage::dispatch(self.name(), seq, self.data())
    }

    pub fn rejected(op: u8, err: &GatewayError) -> Self {
        Self::RequestRejected(RequestRejected::new(op, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_envelope_carries_name_and_seq() {
        let event = Event::RegistrationConfirmed(RegistrationConfirmed {
            id: IdentityId::new("usr_1"),
        });
        let json = serde_json::to_value(event.into_dispatch(4)).unwrap();
        assert_eq!(json["op"], 0);
        assert_eq!(json["t"], "REGISTRATION_CONFIRMED");
        assert_eq!(json["s"], 4);
        assert_eq!(json["d"]["id"], "usr_1");
    }

    #[test]
    fn non_dispatch_frames_omit_name_and_seq() {
        let json = serde_json::to_value(GatewayMessage::heartbeat_ack(9)).unwrap();
        assert_eq!(json["op"], 6);
        assert_eq!(json["d"]["ack"], 9);
        assert!(json.get("t").is_none());
        assert!(json.get("s").is_none());
    }

    #[test]
    fn register_payload_claim_is_optional() {
        let bare: RegisterPayload =
            serde_json::from_value(serde_json::json!({ "display_name": "alice" })).unwrap();
        assert!(bare.claimed_id.is_none());

        let claimed: RegisterPayload = serde_json::from_value(
            serde_json::json!({ "display_name": "alice", "claimed_id": "usr_9" }),
        )
        .unwrap();
        assert_eq!(claimed.claimed_id, Some(IdentityId::new("usr_9")));
    }

    #[test]
    fn rejection_carries_code_and_op() {
        let event = Event::rejected(OP_SEND_GROUP, &GatewayError::Unbound);
        let data = event.data();
        assert_eq!(data["op"], OP_SEND_GROUP);
        assert_eq!(data["code"], "UNBOUND");
    }
}
