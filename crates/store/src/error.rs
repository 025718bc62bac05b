use hotline_protocol::UserId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("invalid user record: {0}")]
    InvalidUser(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
