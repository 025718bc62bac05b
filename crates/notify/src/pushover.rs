use std::time::Duration;

use {
    anyhow::Context,
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use hotline_config::NotificationsConfig;

use crate::NotificationSink;

/// Pushover caps message bodies at 1024 characters.
const MAX_MESSAGE_CHARS: usize = 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends alerts through the Pushover messages API.
pub struct PushoverSink {
    client: reqwest::Client,
    api_url: String,
    token: Secret<String>,
    user: Secret<String>,
    title: String,
}

impl std::fmt::Debug for PushoverSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverSink")
            .field("api_url", &self.api_url)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

impl PushoverSink {
    pub fn new(
        api_url: impl Into<String>,
        token: Secret<String>,
        user: Secret<String>,
        title: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build pushover http client")?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            token,
            user,
            title: title.into(),
        })
    }

    /// Build from config. `Ok(None)` when the token or user key is missing.
    pub fn from_config(config: &NotificationsConfig) -> anyhow::Result<Option<Self>> {
        let pushover = &config.pushover;
        if !pushover.is_configured() {
            return Ok(None);
        }
        let (Some(token), Some(user)) = (pushover.token.clone(), pushover.user.clone()) else {
            return Ok(None);
        };
        Self::new(
            pushover.api_url.clone(),
            Secret::new(token),
            Secret::new(user),
            config.title.clone(),
        )
        .map(Some)
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl NotificationSink for PushoverSink {
    fn id(&self) -> &str {
        "pushover"
    }

    async fn notify(&self, text: &str, sound: &str) -> anyhow::Result<()> {
        let message = truncate_chars(text, MAX_MESSAGE_CHARS);
        let form = [
            ("token", self.token.expose_secret().as_str()),
            ("user", self.user.expose_secret().as_str()),
            ("title", self.title.as_str()),
            ("message", message),
            ("sound", sound),
        ];

        let resp = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .context("pushover request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("pushover rejected notification ({status}): {body}");
        }

        debug!(sound, "pushover notification delivered");
        Ok(())
    }
}
