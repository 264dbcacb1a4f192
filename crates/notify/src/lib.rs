//! Outbound notifications.
//!
//! The pipeline reports task completions, failures and pauses to an external
//! chat channel. Delivery is best-effort: [`Notifier`] logs a failed send and
//! carries on, so a dead webhook never stalls the pipeline.

#![warn(missing_docs)]

mod message;
mod sinks;

pub use message::{Notification, NotificationLevel};
pub use sinks::{LogSink, RecordingSink, WebhookSink};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Result type for notification delivery.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors raised by a sink.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("webhook rejected notification (status {status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// Delivers a structured message to a target.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `notification` to `target` (a channel name, chat id, ...).
    async fn send(&self, target: &str, notification: &Notification) -> Result<()>;
}

/// Fire-and-forget front for a sink.
#[derive(Clone)]
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    target: String,
}

impl Notifier {
    /// Send to `target` through `sink`.
    pub fn new(sink: Arc<dyn NotificationSink>, target: impl Into<String>) -> Self {
        Self {
            sink: Some(sink),
            target: target.into(),
        }
    }

    /// A notifier that drops everything.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            target: String::new(),
        }
    }

    /// Deliver `notification`. Errors are logged and swallowed.
    pub async fn notify(&self, notification: Notification) {
        let Some(sink) = &self.sink else {
            return;
        };

        match sink.send(&self.target, &notification).await {
            Ok(()) => debug!(title = %notification.title, "Notification sent"),
            Err(e) => warn!(error = %e, title = %notification.title, "Failed to send notification"),
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("enabled", &self.sink.is_some())
            .field("target", &self.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn send(&self, _target: &str, _n: &Notification) -> Result<()> {
            Err(NotifyError::Rejected {
                status: 500,
                body: "down".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_is_swallowed() {
        let notifier = Notifier::new(Arc::new(FailingSink), "ops");
        notifier.notify(Notification::info("task complete")).await;
    }

    #[tokio::test]
    async fn test_notifier_forwards_target() {
        let sink = Arc::new(RecordingSink::new());
        let notifier = Notifier::new(sink.clone(), "#builds");
        notifier
            .notify(Notification::warning("task failed").with_field("task", "stage1-task0"))
            .await;
        Notifier::disabled().notify(Notification::info("ignored")).await;

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "#builds");
        assert_eq!(sent[0].1.field("task"), Some("stage1-task0"));
    }
}
