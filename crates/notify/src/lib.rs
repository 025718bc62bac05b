//! Outbound alerts to the administrator.
//!
//! A [`NotificationSink`] delivers one short text with a sound tag. Delivery is
//! best-effort: callers log failures and move on.

pub mod logging;
pub mod pushover;

use async_trait::async_trait;

pub use {logging::LogSink, pushover::PushoverSink};

/// Deliver an alert to the admin's device.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink identifier (e.g. "pushover").
    fn id(&self) -> &str;

    async fn notify(&self, text: &str, sound: &str) -> anyhow::Result<()>;
}

/// Pick the sink described by the notifications config.
///
/// Falls back to [`LogSink`] when notifications are disabled or the Pushover
/// keys are missing.
pub fn from_config(config: &hotline_config::NotificationsConfig) -> Box<dyn NotificationSink> {
    if !config.enabled {
        return Box::new(LogSink);
    }
    match PushoverSink::from_config(config) {
        Ok(Some(sink)) => Box::new(sink),
        Ok(None) => {
            tracing::warn!("notifications enabled but pushover token/user missing, logging only");
            Box::new(LogSink)
        },
        Err(e) => {
            tracing::warn!(error = %e, "failed to build pushover client, logging only");
            Box::new(LogSink)
        },
    }
}
