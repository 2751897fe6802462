//! Outbound notification sink.
//!
//! Notifications are fire-and-forget: the coordinator spawns the delivery and
//! never looks at the result beyond a debug log line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeNotification {
    pub event: String,
    pub ram_percent: f64,
    pub freed_memory_mb: f64,
    pub timestamp: DateTime<Utc>,
}

impl SpikeNotification {
    pub fn ram_spike(ram_percent: f64, freed_memory_mb: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            event: "ram_spike".to_string(),
            ram_percent,
            freed_memory_mb,
            timestamp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &SpikeNotification) -> Result<(), NotifyError>;
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &SpikeNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Posts notifications as JSON to a webhook URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            url: url.into(),
            timeout,
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &SpikeNotification) -> Result<(), NotifyError> {
        self.client
            .post(&self.url)
            .json(notification)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
