//! Success notification.
//!
//! Best-effort: a notifier failure is logged by the caller and never changes
//! the outcome of the run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

/// Receives a signal once the transfer step has completed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self) -> Result<()>;
}

/// Pings a webhook URL with a body-less GET.
pub struct WebhookNotifier {
    http: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).context("Invalid webhook URL")?;
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client for webhook")?;
        Ok(Self { http, url })
    }

    /// Host of the webhook. The rest of the URL usually embeds a secret
    /// token and is never logged.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_success(&self) -> Result<()> {
        debug!(host = self.host(), "Calling webhook");
        self.http
            .get(self.url.clone())
            .send()
            .await
            .context("Webhook request failed")?
            .error_for_status()
            .context("Webhook returned an error status")?;
        Ok(())
    }
}
