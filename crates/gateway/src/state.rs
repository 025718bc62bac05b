use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use {
    serde::Serialize,
    tokio::sync::{RwLock, mpsc},
};

use hotline_protocol::Role;

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the relay.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: String,
    /// Identity most recently announced on this connection, `None` until the
    /// first `identify`.
    pub role: Option<Role>,
    /// Channel for sending serialized frames to this client's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
    pub remote_addr: Option<SocketAddr>,
}

impl ConnectedClient {
    pub fn new(
        conn_id: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            role: None,
            sender,
            connected_at: Instant::now(),
            remote_addr,
        }
    }

    /// Send a serialized JSON frame to this client.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Connection registry ──────────────────────────────────────────────────────

/// Live connections keyed by conn_id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<String, ConnectedClient>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, unidentified connection.
    pub async fn register(&self, client: ConnectedClient) {
        let conn_id = client.conn_id.clone();
        self.clients.write().await.insert(conn_id, client);
    }

    /// Bind (or rebind) the identity of a connection. Returns false when the
    /// connection is already gone.
    pub async fn identify(&self, conn_id: &str, role: Role) -> bool {
        match self.clients.write().await.get_mut(conn_id) {
            Some(client) => {
                client.role = Some(role);
                true
            },
            None => false,
        }
    }

    /// Remove a client by conn_id. Returns the removed client if found.
    pub async fn remove(&self, conn_id: &str) -> Option<ConnectedClient> {
        self.clients.write().await.remove(conn_id)
    }

    pub async fn role_of(&self, conn_id: &str) -> Option<Role> {
        self.clients
            .read()
            .await
            .get(conn_id)
            .and_then(|client| client.role)
    }

    /// Number of connected clients.
    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Unicast a frame. Returns false if the connection is gone or its write
    /// loop has stopped.
    pub async fn send_to(&self, conn_id: &str, frame: &str) -> bool {
        self.clients
            .read()
            .await
            .get(conn_id)
            .is_some_and(|client| client.send(frame))
    }

    /// Send `frame` to every client accepted by `filter`. Returns how many
    /// write loops took the frame.
    pub async fn broadcast<F>(&self, frame: &str, filter: F) -> usize
    where
        F: Fn(&ConnectedClient) -> bool,
    {
        self.clients
            .read()
            .await
            .values()
            .filter(|client| filter(*client))
            .filter(|client| client.send(frame))
            .count()
    }
}

// ── Relay counters ───────────────────────────────────────────────────────────

/// In-process counters surfaced on `/health`.
#[derive(Debug, Default)]
pub struct RelayStats {
    messages_appended: AtomicU64,
    append_failures: AtomicU64,
    history_failures: AtomicU64,
    malformed_frames: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsSnapshot {
    pub messages_appended: u64,
    pub append_failures: u64,
    pub history_failures: u64,
    pub malformed_frames: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

impl RelayStats {
    pub fn record_append(&self) {
        self.messages_appended.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("hotline_messages_appended_total").increment(1);
    }

    pub fn record_append_failure(&self) {
        self.append_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("hotline_append_failures_total").increment(1);
    }

    pub fn record_history_failure(&self) {
        self.history_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("hotline_history_failures_total").increment(1);
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("hotline_malformed_frames_total").increment(1);
    }

    pub fn record_notification(&self, delivered: bool) {
        let (counter, status) = if delivered {
            (&self.notifications_sent, "sent")
        } else {
            (&self.notifications_failed, "failed")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("hotline_notifications_total", "status" => status).increment(1);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            messages_appended: self.messages_appended.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            history_failures: self.history_failures.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
        }
    }
}
