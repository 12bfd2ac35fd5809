//! User-visible notifications
//!
//! Success, info and error messages emitted by workflow components, published
//! on a broadcast channel for whatever renders them (toasts, CLI output).
//! Every notification is also logged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;

use crate::document::DocumentId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationLevel::Success => write!(f, "success"),
            NotificationLevel::Info => write!(f, "info"),
            NotificationLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            document_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder method: attach the document this is about
    pub fn document(mut self, id: &DocumentId) -> Self {
        self.document_id = Some(id.clone());
        self
    }
}

/// Cloneable handle for publishing notifications
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn send(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => tracing::warn!(
                document_id = ?notification.document_id,
                "{}",
                notification.message
            ),
            _ => tracing::info!(
                document_id = ?notification.document_id,
                "{}",
                notification.message
            ),
        }

        // Nobody listening is not an error
        let _ = self.sender.send(notification);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.send(Notification::new(NotificationLevel::Success, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(Notification::new(NotificationLevel::Info, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(Notification::new(NotificationLevel::Error, message));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(128)
    }
}

/// Drain everything currently buffered on a receiver
pub fn drain(receiver: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(notification) => out.push(notification),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification receiver lagged");
            }
            Err(_) => break,
        }
    }
    out
}
