//! Sink implementations.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::json;
use tracing::info;

use crate::{Notification, NotificationSink, NotifyError, Result};

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, target: &str, notification: &Notification) -> Result<()> {
        info!(target_channel = target, "{}", notification.to_text());
        Ok(())
    }
}

/// Posts notifications as JSON to a chat webhook.
///
/// Body: `{"target", "text", "title", "level", "fields": {..}}`.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    /// Sink posting to `url` with a 10 second request timeout.
    ///
    /// Fails when the HTTP client cannot be built (for example, no TLS backend).
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = ClientBuilder::new().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, target: &str, notification: &Notification) -> Result<()> {
        let fields: serde_json::Map<String, serde_json::Value> = notification
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();

        let payload = json!({
            "target": target,
            "text": notification.to_text(),
            "title": notification.title,
            "level": notification.level,
            "fields": fields,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, as `(target, notification)`.
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Titles sent so far.
    pub fn titles(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, n)| n.title).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, target: &str, notification: &Notification) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((target.to_string(), notification.clone()));
        }
        Ok(())
    }
}
