use {async_trait::async_trait, tracing::info};

use crate::NotificationSink;

/// Writes notifications to the log instead of a device.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn id(&self) -> &str {
        "log"
    }

    async fn notify(&self, text: &str, sound: &str) -> anyhow::Result<()> {
        info!(sound, chars = text.chars().count(), "notification (log sink)");
        Ok(())
    }
}
