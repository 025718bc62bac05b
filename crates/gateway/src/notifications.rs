use std::sync::Arc;

use {
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use {
    hotline_notify::NotificationSink,
    hotline_protocol::UserId,
    hotline_store::{Error as StoreError, UserDirectory},
};

use crate::state::RelayStats;

/// A user-sent message the admin should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub user_id: UserId,
    pub text: String,
}

/// Sending half of the notification channel. Never blocks.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationRequest>,
}

impl Notifier {
    /// Create a notifier and the worker that drains it. The worker stops once
    /// every clone of the notifier is dropped.
    pub fn channel(
        directory: Arc<dyn UserDirectory>,
        sink: Arc<dyn NotificationSink>,
        sound: impl Into<String>,
        stats: Arc<RelayStats>,
    ) -> (Self, NotificationWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = NotificationWorker {
            rx,
            directory,
            sink,
            sound: sound.into(),
            stats,
        };
        (Self { tx }, worker)
    }

    pub fn notify(&self, request: NotificationRequest) {
        if self.tx.send(request).is_err() {
            debug!("notification worker stopped, dropping request");
        }
    }
}

/// Message body for a notification. Falls back to the numeric id when the
/// sender's name is unavailable.
pub fn compose_body(name: Option<&str>, user_id: UserId, text: &str) -> String {
    match name {
        Some(name) => format!("{name}: {text}"),
        None => format!("New message from user #{user_id}: {text}"),
    }
}

pub struct NotificationWorker {
    rx: mpsc::UnboundedReceiver<NotificationRequest>,
    directory: Arc<dyn UserDirectory>,
    sink: Arc<dyn NotificationSink>,
    sound: String,
    stats: Arc<RelayStats>,
}

impl NotificationWorker {
    /// Deliver requests one at a time until the channel closes.
    pub async fn run(mut self) {
        debug!(sink = self.sink.id(), "notification worker started");
        while let Some(request) = self.rx.recv().await {
            self.deliver(request).await;
        }
        debug!("notification worker finished");
    }

    async fn deliver(&self, request: NotificationRequest) {
        let name = match self.directory.lookup_name(request.user_id).await {
            Ok(name) => Some(name),
            Err(StoreError::UnknownUser(user_id)) => {
                warn!(user_id, "notification for unknown user, sending degraded body");
                None
            },
            Err(e) => {
                warn!(user_id = request.user_id, error = %e, "user lookup failed, sending degraded body");
                None
            },
        };

        let body = compose_body(name.as_deref(), request.user_id, &request.text);
        match self.sink.notify(&body, &self.sound).await {
            Ok(()) => {
                self.stats.record_notification(true);
                debug!(user_id = request.user_id, sink = self.sink.id(), "notification sent");
            },
            Err(e) => {
                self.stats.record_notification(false);
                warn!(user_id = request.user_id, sink = self.sink.id(), error = %e, "notification failed");
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use {async_trait::async_trait, hotline_store::Result as StoreResult};

    use super::*;

    /// Records every delivery; fails when `fail` is set.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub calls: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn id(&self) -> &str {
            "recording"
        }

        async fn notify(&self, text: &str, sound: &str) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), sound.to_string()));
            if self.fail {
                anyhow::bail!("device unreachable");
            }
            Ok(())
        }
    }

    struct FixedDirectory;

    #[async_trait]
    impl UserDirectory for FixedDirectory {
        async fn lookup_name(&self, user_id: UserId) -> StoreResult<String> {
            match user_id {
                5 => Ok("Ada".into()),
                other => Err(StoreError::UnknownUser(other)),
            }
        }
    }

    fn request(user_id: UserId, text: &str) -> NotificationRequest {
        NotificationRequest {
            user_id,
            text: text.into(),
        }
    }

    #[test]
    fn body_formats() {
        assert_eq!(compose_body(Some("Ada"), 5, "hi"), "Ada: hi");
        assert_eq!(
            compose_body(None, 7, "hi"),
            "New message from user #7: hi"
        );
    }

    #[tokio::test]
    async fn worker_names_sender_and_degrades() {
        let sink = Arc::new(RecordingSink::default());
        let stats = Arc::new(RelayStats::default());
        let (notifier, worker) = Notifier::channel(
            Arc::new(FixedDirectory),
            sink.clone(),
            "magic",
            stats.clone(),
        );

        notifier.notify(request(5, "hello"));
        notifier.notify(request(7, "who am i"));
        drop(notifier);
        worker.run().await;

        assert_eq!(sink.calls(), vec![
            ("Ada: hello".to_string(), "magic".to_string()),
            (
                "New message from user #7: who am i".to_string(),
                "magic".to_string()
            ),
        ]);
        assert_eq!(stats.snapshot().notifications_sent, 2);
    }

    #[tokio::test]
    async fn sink_failure_is_counted_not_propagated() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let stats = Arc::new(RelayStats::default());
        let (notifier, worker) =
            Notifier::channel(Arc::new(FixedDirectory), sink.clone(), "x", stats.clone());

        notifier.notify(request(5, "one"));
        notifier.notify(request(5, "two"));
        drop(notifier);
        worker.run().await;

        assert_eq!(sink.calls().len(), 2);
        assert_eq!(stats.snapshot().notifications_failed, 2);
    }

    #[tokio::test]
    async fn notify_after_worker_gone_is_silent() {
        let (notifier, worker) = Notifier::channel(
            Arc::new(FixedDirectory),
            Arc::new(RecordingSink::default()),
            "x",
            Arc::new(RelayStats::default()),
        );
        drop(worker);
        notifier.notify(request(5, "lost"));
    }
}
