//! Notification messages and their plain-text rendering.

use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Progress
    Info,
    /// A retryable failure
    Warning,
    /// The pipeline needs a human
    Critical,
}

impl NotificationLevel {
    /// Emoji prefix for chat rendering.
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Info => "✅",
            Self::Warning => "⚠️",
            Self::Critical => "⏸️",
        }
    }
}

/// A title plus ordered key/value fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Short headline
    pub title: String,
    /// Severity
    pub level: NotificationLevel,
    /// Ordered fields
    pub fields: Vec<(String, String)>,
}

impl Notification {
    /// New notification with no fields.
    pub fn new(level: NotificationLevel, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            level,
            fields: Vec::new(),
        }
    }

    /// Informational notification.
    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title)
    }

    /// Warning notification.
    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title)
    }

    /// Critical notification.
    pub fn critical(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Critical, title)
    }

    /// Append a field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// First value stored under `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Plain-text rendering: headline, then one `key: value` line per field.
    pub fn to_text(&self) -> String {
        let mut text = format!("{} {}", self.level.emoji(), self.title);
        for (key, value) in &self.fields {
            if value.contains('\n') {
                text.push_str(&format!("\n{}:\n{}", key, value));
            } else {
                text.push_str(&format!("\n{}: {}", key, value));
            }
        }
        text
    }
}
