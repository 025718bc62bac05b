use serde::{Deserialize, Serialize};

use crate::{Error, Message, NewMessage, Role, SenderRole, UserId, events};

// ── Client → relay ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyParams {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendParams {
    pub message: String,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub sender_role: SenderRole,
}

impl SendParams {
    pub fn into_new_message(self) -> NewMessage {
        NewMessage::new(self.message, self.user_id, self.sender_role)
            .with_receiver(self.receiver_id)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Identify(Role),
    Send(SendParams),
}

impl ClientFrame {
    /// Decode a text frame.
    ///
    /// The `send` payload is normally a JSON string holding the encoded
    /// object; a bare object is accepted as well. A send must name a real
    /// conversation, so its `userId` has to be positive.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let raw: RawFrame = serde_json::from_str(text)?;
        match raw.event.as_str() {
            events::IDENTIFY => {
                let params: IdentifyParams = serde_json::from_value(raw.payload)?;
                Ok(Self::Identify(Role::from_wire(params.user_id)?))
            },
            events::SEND => {
                let params: SendParams = match raw.payload {
                    serde_json::Value::String(encoded) => serde_json::from_str(&encoded)?,
                    other => serde_json::from_value(other)?,
                };
                if params.user_id <= 0 {
                    return Err(Error::InvalidUserId(params.user_id));
                }
                Ok(Self::Send(params))
            },
            other => Err(Error::UnknownEvent(other.to_string())),
        }
    }
}

// ── Relay → client ───────────────────────────────────────────────────────────

/// Outbound envelope, serialized once per broadcast.
#[derive(Debug, Serialize)]
pub struct EventFrame<'a, T: Serialize> {
    pub event: &'a str,
    pub payload: &'a T,
}

impl<'a, T: Serialize> EventFrame<'a, T> {
    pub fn new(event: &'a str, payload: &'a T) -> Self {
        Self { event, payload }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Payload of the `new-message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub user_id: UserId,
    pub message: Message,
}

/// Payload of the `send-failed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFailedEvent {
    pub message: String,
    pub reason: String,
}
