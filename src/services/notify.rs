//! Notification side channel for newly posted requests.
//!
//! DESIGN
//! ======
//! Posting a request fires one JSON notification at an external delivery
//! endpoint. Delivery runs on its own task: the submitter's reply never
//! waits on it, and failures are logged and dropped, never retried.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Payload delivered to the notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub display_name: String,
    pub title: String,
    pub message: String,
    pub link: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notification endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Webhook configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub webhook_url: String,
    /// Link to the wall included in every notification.
    pub wall_url: String,
    pub timeout: Duration,
}

impl NotifyConfig {
    /// Load from `NOTIFY_WEBHOOK_URL`, `WALL_PUBLIC_URL`, `NOTIFY_TIMEOUT_SECS`.
    /// Returns `None` when no webhook is configured (notifications disabled).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let webhook_url = std::env::var("NOTIFY_WEBHOOK_URL").ok()?;
        let wall_url = std::env::var("WALL_PUBLIC_URL").unwrap_or_else(|_| "/prayerrequests.html".into());
        let timeout_secs = crate::services::env_parse("NOTIFY_TIMEOUT_SECS", DEFAULT_NOTIFY_TIMEOUT_SECS);
        Some(Self { webhook_url, wall_url, timeout: Duration::from_secs(timeout_secs) })
    }
}

/// Posts notifications as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: NotifyConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Wrap into the handle the wall uses, carrying the configured link.
    #[must_use]
    pub fn into_handle(self) -> NotifyHandle {
        let link = self.config.wall_url.clone();
        NotifyHandle { notifier: Arc::new(self), link }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.config.webhook_url)
            .json(notification)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }
        Ok(())
    }
}

/// A notifier plus the wall link stamped on every notification.
#[derive(Clone)]
pub struct NotifyHandle {
    pub notifier: Arc<dyn Notifier>,
    pub link: String,
}

impl NotifyHandle {
    /// Announce a newly posted request without waiting for delivery.
    pub fn announce(&self, display_name: &str, title: &str, message: &str) {
        let notification = Notification {
            display_name: display_name.to_owned(),
            title: title.to_owned(),
            message: message.to_owned(),
            link: self.link.clone(),
        };
        notify_fire_and_forget(Arc::clone(&self.notifier), notification);
    }
}

/// Deliver on a detached task. Outcome is only ever logged.
pub fn notify_fire_and_forget(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        match notifier.notify(&notification).await {
            Ok(()) => info!(title = %notification.title, "notify: delivered"),
            Err(e) => warn!(title = %notification.title, error = %e, "notify: delivery failed"),
        }
    });
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
