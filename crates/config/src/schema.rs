/// Config schema types (server, database, admin login, relay, notifications).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotlineConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub admin: AdminConfig,
    pub relay: RelayConfig,
    pub notifications: NotificationsConfig,
}

/// HTTP + WebSocket listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `~/.hotline/chat.db`.
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("chat.db"))
    }
}

/// Credentials that log in as the administrator pseudo-user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub name: String,
    pub company: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            name: "Admin".into(),
            company: "System".into(),
        }
    }
}

impl AdminConfig {
    /// Compare a login pair against the admin credentials, ignoring
    /// surrounding whitespace.
    pub fn matches(&self, name: &str, company: &str) -> bool {
        name.trim() == self.name && company.trim() == self.company
    }
}

/// Who receives a `new-message` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fanout {
    /// Every live connection; clients filter by `userId`.
    #[default]
    All,
    /// Only connections bound to the admin or to the conversation's user.
    Participants,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub fanout: Fanout,
    /// Tell the sender when its message could not be stored.
    pub report_send_failures: bool,
}

/// Push notifications to the admin's phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub title: String,
    /// Sound tag passed to the push provider.
    pub sound: String,
    pub pushover: PushoverConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            title: "Hotline".into(),
            sound: "pushover".into(),
            pushover: PushoverConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushoverConfig {
    /// Application API token. Use `${PUSHOVER_TOKEN}` to keep it out of the file.
    pub token: Option<String>,
    /// User (or group) key receiving the notification.
    pub user: Option<String>,
    pub api_url: String,
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            token: None,
            user: None,
            api_url: "https://api.pushover.net/1/messages.json".into(),
        }
    }
}

impl PushoverConfig {
    pub fn is_configured(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
            && self.user.as_deref().is_some_and(|u| !u.is_empty())
    }
}
