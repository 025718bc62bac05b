//! Persistence for the hotline relay.
//!
//! One SQLite database holds two tables: `users` (owned by the admin CRUD
//! surface) and `messages` (the append-only chat log, keyed by a monotonic
//! id). The relay only talks to it through [`MessageStore`] and
//! [`UserDirectory`]; writes are serialized inside [`SqliteStore`].

pub mod db;
pub mod error;
pub mod messages;
pub mod users;

pub use {
    db::SqliteStore,
    error::{Error, Result},
    messages::MessageStore,
    users::{NewUser, User, UserDirectory, UserSummary},
};
