//! Hotline wire protocol.
//!
//! Every realtime frame is a JSON envelope `{"event": <name>, "payload": <value>}`
//! carried as a WebSocket text message. Clients announce who they are with
//! `identify`, submit chat lines with `send`, and receive `history` (unicast,
//! once per identify) and `new-message` (fan-out) events.

pub mod error;
pub mod frames;
pub mod types;

pub use {
    error::Error,
    frames::{ClientFrame, EventFrame, IdentifyParams, NewMessageEvent, SendFailedEvent, SendParams},
    types::{Message, MessageId, NewMessage, Role, SenderRole, UserId},
};

pub const PROTOCOL_VERSION: u32 = 1;

/// Wire id of the administrator pseudo-user.
pub const ADMIN_USER_ID: UserId = 0;

/// Event names used in frame envelopes.
pub mod events {
    pub const IDENTIFY: &str = "identify";
    pub const SEND: &str = "send";
    pub const HISTORY: &str = "history";
    pub const NEW_MESSAGE: &str = "new-message";
    pub const SEND_FAILED: &str = "send-failed";
}
