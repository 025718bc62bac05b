use std::{net::SocketAddr, sync::Arc};

use {
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use {
    hotline_config::RelayConfig,
    hotline_protocol::{
        ClientFrame, EventFrame, Message, Role, SendFailedEvent, SendParams, SenderRole, events,
    },
    hotline_store::MessageStore,
};

use crate::{
    broadcast::broadcast_new_message,
    notifications::{NotificationRequest, Notifier},
    state::{ConnectedClient, ConnectionRegistry, RelayStats},
};

/// `send-failed` reason for any append error.
const STORAGE_UNAVAILABLE: &str = "storage unavailable";

/// Per-connection protocol handling: history replay on identify, persist then
/// fan out on send, cleanup on disconnect.
///
/// Store failures and malformed frames are logged and counted; none of them
/// close the connection.
pub struct ChatRelay {
    store: Arc<dyn MessageStore>,
    registry: ConnectionRegistry,
    notifier: Notifier,
    stats: Arc<RelayStats>,
    config: RelayConfig,
}

impl ChatRelay {
    pub fn new(
        store: Arc<dyn MessageStore>,
        notifier: Notifier,
        stats: Arc<RelayStats>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            registry: ConnectionRegistry::new(),
            notifier,
            stats,
            config,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Register a new connection with no identity. Returns its conn_id.
    pub async fn connect(
        &self,
        sender: mpsc::UnboundedSender<String>,
        remote_addr: Option<SocketAddr>,
    ) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();
        self.registry
            .register(ConnectedClient::new(conn_id.clone(), sender, remote_addr))
            .await;
        info!(conn_id = %conn_id, remote_ip = ?remote_addr, "client connected");
        conn_id
    }

    /// Decode and dispatch one inbound text frame.
    pub async fn handle_frame(&self, conn_id: &str, text: &str) {
        match ClientFrame::parse(text) {
            Ok(ClientFrame::Identify(role)) => self.identify(conn_id, role).await,
            Ok(ClientFrame::Send(params)) => {
                self.send(conn_id, params).await;
            },
            Err(e) => {
                self.stats.record_malformed();
                warn!(conn_id, error = %e, "dropping malformed frame");
            },
        }
    }

    /// Bind `role` to the connection and replay its history to it alone.
    pub async fn identify(&self, conn_id: &str, role: Role) {
        if !self.registry.identify(conn_id, role).await {
            debug!(conn_id, "identify on a closed connection");
            return;
        }
        info!(conn_id, role = %role, "client identified");

        let history = match self.store.list_for(role).await {
            Ok(history) => history,
            Err(e) => {
                self.stats.record_history_failure();
                warn!(conn_id, role = %role, error = %e, "failed to load history");
                return;
            },
        };

        match EventFrame::new(events::HISTORY, &history).to_json() {
            Ok(frame) => {
                if !self.registry.send_to(conn_id, &frame).await {
                    debug!(conn_id, "connection closed before history was sent");
                }
            },
            Err(e) => warn!(conn_id, error = %e, "failed to serialize history"),
        }
    }

    /// Persist a message, then fan it out and queue an admin notification for
    /// user-sent lines. Returns the stored record, or `None` when the append
    /// failed.
    pub async fn send(&self, conn_id: &str, params: SendParams) -> Option<Message> {
        let new_message = params.into_new_message();
        let submitted = self
            .config
            .report_send_failures
            .then(|| new_message.text.clone());

        let message = match self.store.append(new_message).await {
            Ok(message) => message,
            Err(e) => {
                self.stats.record_append_failure();
                warn!(conn_id, error = %e, "failed to store message");
                if let Some(text) = submitted {
                    self.report_failure(conn_id, text).await;
                }
                return None;
            },
        };
        self.stats.record_append();

        broadcast_new_message(&self.registry, self.config.fanout, &message).await;

        if message.sender_role != SenderRole::Admin {
            self.notifier.notify(NotificationRequest {
                user_id: message.user_id,
                text: message.text.clone(),
            });
        }
        Some(message)
    }

    /// Tell the sender its line was not stored. Store errors stay in the log.
    async fn report_failure(&self, conn_id: &str, message: String) {
        let payload = SendFailedEvent {
            message,
            reason: STORAGE_UNAVAILABLE.to_string(),
        };
        match EventFrame::new(events::SEND_FAILED, &payload).to_json() {
            Ok(frame) => {
                self.registry.send_to(conn_id, &frame).await;
            },
            Err(e) => warn!(conn_id, error = %e, "failed to serialize send-failed"),
        }
    }

    /// Forget the connection. Appends it started still finish and broadcast.
    pub async fn disconnect(&self, conn_id: &str) {
        match self.registry.remove(conn_id).await {
            Some(client) => info!(
                conn_id,
                role = ?client.role,
                duration_secs = client.connected_at.elapsed().as_secs(),
                "client disconnected"
            ),
            None => debug!(conn_id, "disconnect for unknown connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        hotline_config::Fanout,
        hotline_store::{NewUser, SqliteStore},
        serde_json::Value,
    };

    use super::*;
    use crate::notifications::{NotificationWorker, tests::RecordingSink};

    struct Harness {
        relay: ChatRelay,
        store: Arc<SqliteStore>,
        sink: Arc<RecordingSink>,
        stats: Arc<RelayStats>,
        worker: NotificationWorker,
    }

    impl Harness {
        async fn new(config: RelayConfig) -> Self {
            let store = Arc::new(SqliteStore::in_memory().await.unwrap());
            let sink = Arc::new(RecordingSink::default());
            let stats = Arc::new(RelayStats::default());
            let (notifier, worker) =
                Notifier::channel(store.clone(), sink.clone(), "pushover", stats.clone());
            let relay = ChatRelay::new(store.clone(), notifier, stats.clone(), config);
            Self {
                relay,
                store,
                sink,
                stats,
                worker,
            }
        }

        async fn client(&self) -> (String, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (self.relay.connect(tx, None).await, rx)
        }

        /// Close the relay and wait for every queued notification.
        async fn notifications(self) -> Vec<(String, String)> {
            drop(self.relay);
            self.worker.run().await;
            self.sink.calls()
        }
    }

    fn identify(user_id: i64) -> String {
        serde_json::json!({ "event": "identify", "payload": { "userId": user_id } }).to_string()
    }

    fn send(text: &str, user_id: i64, role: &str) -> String {
        let inner = serde_json::json!({ "message": text, "userId": user_id, "senderRole": role });
        serde_json::json!({ "event": "send", "payload": inner.to_string() }).to_string()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn identify_without_messages_gets_empty_history() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, mut rx) = h.client().await;

        h.relay.handle_frame(&conn, &identify(5)).await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "history");
        assert_eq!(frames[0]["payload"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn admin_history_is_everything() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, mut rx) = h.client().await;
        h.relay.handle_frame(&conn, &send("a", 1, "user")).await;
        h.relay.handle_frame(&conn, &send("b", 2, "user")).await;
        h.relay.handle_frame(&conn, &send("c", 1, "admin")).await;
        drain(&mut rx);

        h.relay.handle_frame(&conn, &identify(0)).await;
        let frames = drain(&mut rx);
        let history: Vec<Message> = serde_json::from_value(frames[0]["payload"].clone()).unwrap();
        assert_eq!(history, h.store.list_all().await.unwrap());
        assert_eq!(history.len(), 3);

        h.relay.handle_frame(&conn, &identify(1)).await;
        let frames = drain(&mut rx);
        let history: Vec<Message> = serde_json::from_value(frames[0]["payload"].clone()).unwrap();
        assert_eq!(history.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(), vec![
            "a", "c"
        ]);
    }

    #[tokio::test]
    async fn history_goes_only_to_the_identifying_connection() {
        let h = Harness::new(RelayConfig::default()).await;
        let (a, mut rx_a) = h.client().await;
        let (_b, mut rx_b) = h.client().await;

        h.relay.handle_frame(&a, &identify(5)).await;
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn user_send_persists_broadcasts_and_notifies_once() {
        let h = Harness::new(RelayConfig::default()).await;
        let ada = h
            .store
            .create_user(NewUser {
                name: "Ada".into(),
                company: "Acme".into(),
                cover_letter: None,
            })
            .await
            .unwrap();
        let (sender, mut rx_sender) = h.client().await;
        let (admin, mut rx_admin) = h.client().await;
        let (_idle, mut rx_idle) = h.client().await;
        h.relay.handle_frame(&sender, &identify(ada.id)).await;
        h.relay.handle_frame(&admin, &identify(0)).await;
        drain(&mut rx_sender);
        drain(&mut rx_admin);

        h.relay.handle_frame(&sender, &send("hi", ada.id, "user")).await;

        let stored = h.store.list_for_user(ada.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        for rx in [&mut rx_sender, &mut rx_admin, &mut rx_idle] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["event"], "new-message");
            assert_eq!(frames[0]["payload"]["userId"], ada.id);
            assert_eq!(frames[0]["payload"]["message"]["id"], stored[0].id);
            assert_eq!(frames[0]["payload"]["message"]["text"], "hi");
        }
        assert_eq!(h.stats.snapshot().messages_appended, 1);

        assert_eq!(h.notifications().await, vec![(
            "Ada: hi".to_string(),
            "pushover".to_string()
        )]);
    }

    #[tokio::test]
    async fn admin_send_does_not_notify() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, _rx) = h.client().await;
        h.relay.handle_frame(&conn, &identify(0)).await;
        h.relay.handle_frame(&conn, &send("reply", 5, "admin")).await;

        assert_eq!(h.store.list_for_user(5).await.unwrap().len(), 1);
        assert!(h.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_sender_gets_degraded_notification() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, _rx) = h.client().await;
        h.relay.handle_frame(&conn, &send("anyone?", 42, "user")).await;

        assert_eq!(h.notifications().await, vec![(
            "New message from user #42: anyone?".to_string(),
            "pushover".to_string()
        )]);
    }

    #[tokio::test]
    async fn malformed_send_is_dropped() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, mut rx) = h.client().await;
        h.relay.handle_frame(&conn, &identify(5)).await;
        drain(&mut rx);

        let cases = [
            "garbage".to_string(),
            r#"{"event":"send","payload":"{broken"}"#.to_string(),
            send("no conversation", 0, "admin"),
            send("bad role", 5, "owner"),
            r#"{"event":"wave","payload":{}}"#.to_string(),
        ];
        for case in &cases {
            h.relay.handle_frame(&conn, case).await;
        }

        assert!(drain(&mut rx).is_empty());
        assert!(h.store.list_all().await.unwrap().is_empty());
        assert_eq!(h.stats.snapshot().malformed_frames, cases.len() as u64);
        assert_eq!(h.relay.registry().count().await, 1);
        assert!(h.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn same_user_on_two_connections_gets_every_broadcast() {
        let h = Harness::new(RelayConfig {
            fanout: Fanout::Participants,
            ..Default::default()
        })
        .await;
        let (tab1, mut rx1) = h.client().await;
        let (tab2, mut rx2) = h.client().await;
        let (other, mut rx_other) = h.client().await;
        h.relay.handle_frame(&tab1, &identify(5)).await;
        h.relay.handle_frame(&tab2, &identify(5)).await;
        h.relay.handle_frame(&other, &identify(6)).await;
        drain(&mut rx1);
        drain(&mut rx2);
        drain(&mut rx_other);

        h.relay.handle_frame(&tab1, &send("one", 5, "user")).await;
        h.relay.handle_frame(&tab2, &send("two", 5, "user")).await;

        assert_eq!(drain(&mut rx1).len(), 2);
        assert_eq!(drain(&mut rx2).len(), 2);
        assert!(drain(&mut rx_other).is_empty());
    }

    #[tokio::test]
    async fn send_before_identify_is_processed() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, mut rx) = h.client().await;
        h.relay.handle_frame(&conn, &send("early", 3, "user")).await;

        assert_eq!(h.store.list_for_user(3).await.unwrap().len(), 1);
        assert_eq!(drain(&mut rx)[0]["event"], "new-message");
    }

    #[tokio::test]
    async fn store_failure_is_silent_by_default() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, mut rx) = h.client().await;
        h.store.close().await;

        h.relay.handle_frame(&conn, &identify(5)).await;
        h.relay.handle_frame(&conn, &send("lost", 5, "user")).await;

        assert!(drain(&mut rx).is_empty());
        let snap = h.stats.snapshot();
        assert_eq!(snap.history_failures, 1);
        assert_eq!(snap.append_failures, 1);
        assert_eq!(snap.messages_appended, 0);
        assert_eq!(h.relay.registry().role_of(&conn).await, Some(Role::User(5)));
        assert!(h.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_reported_to_sender_when_enabled() {
        let h = Harness::new(RelayConfig {
            report_send_failures: true,
            ..Default::default()
        })
        .await;
        let (conn, mut rx) = h.client().await;
        let (_other, mut rx_other) = h.client().await;
        h.store.close().await;

        h.relay.handle_frame(&conn, &send("lost", 5, "user")).await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "send-failed");
        assert_eq!(frames[0]["payload"]["message"], "lost");
        assert_eq!(frames[0]["payload"]["reason"], "storage unavailable");
        assert!(drain(&mut rx_other).is_empty());
    }

    #[tokio::test]
    async fn disconnect_removes_silently() {
        let h = Harness::new(RelayConfig::default()).await;
        let (conn, _rx) = h.client().await;
        let (other, mut rx_other) = h.client().await;

        h.relay.disconnect(&conn).await;
        h.relay.disconnect(&conn).await;
        assert_eq!(h.relay.registry().count().await, 1);

        // An append that outlives its connection still reaches everyone else.
        h.relay.send(&conn, SendParams {
            message: "late".into(),
            user_id: 5,
            receiver_id: None,
            sender_role: SenderRole::User,
        })
        .await
        .unwrap();
        assert_eq!(drain(&mut rx_other).len(), 1);
        h.relay.disconnect(&other).await;
    }
}
