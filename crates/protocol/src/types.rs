use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ADMIN_USER_ID, Error};

pub type UserId = i64;
pub type MessageId = i64;

// ── Roles ────────────────────────────────────────────────────────────────────

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Admin,
}

impl SenderRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(Error::UnknownSenderRole(other.to_string())),
        }
    }
}

/// Identity bound to a connection.
///
/// On the wire the administrator is user id `0`; inside the relay the two
/// cases are kept apart so a real user can never be mistaken for the admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    User(UserId),
}

impl Role {
    /// Decode a wire user id. Negative ids are rejected.
    pub fn from_wire(user_id: UserId) -> Result<Self, Error> {
        match user_id {
            ADMIN_USER_ID => Ok(Self::Admin),
            id if id > 0 => Ok(Self::User(id)),
            id => Err(Error::InvalidUserId(id)),
        }
    }

    pub fn wire_id(self) -> UserId {
        match self {
            Self::Admin => ADMIN_USER_ID,
            Self::User(id) => id,
        }
    }

    /// Whether this identity is a party to the conversation of `user_id`.
    pub fn participates_in(self, user_id: UserId) -> bool {
        match self {
            Self::Admin => true,
            Self::User(id) => id == user_id,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

// ── Messages ─────────────────────────────────────────────────────────────────

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub sender_role: SenderRole,
}

/// A message that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub user_id: UserId,
    pub receiver_id: Option<UserId>,
    pub sender_role: SenderRole,
}

impl NewMessage {
    pub fn new(text: impl Into<String>, user_id: UserId, sender_role: SenderRole) -> Self {
        Self {
            text: text.into(),
            user_id,
            receiver_id: None,
            sender_role,
        }
    }

    pub fn with_receiver(mut self, receiver_id: Option<UserId>) -> Self {
        self.receiver_id = receiver_id;
        self
    }

    /// Attach the store-assigned id.
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            text: self.text,
            user_id: self.user_id,
            receiver_id: self.receiver_id,
            sender_role: self.sender_role,
        }
    }
}
