use crate::UserId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid user id {0}")]
    InvalidUserId(UserId),

    #[error("unknown sender role: {0}")]
    UnknownSenderRole(String),
}
