//! Outbound notification backends

pub mod email;
pub mod telegram;
pub mod webhook;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;

use crate::error::Result;
use crate::supervisor::{AlertLevel, EventKind, SupervisorEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Payload handed to every backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub target: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertLevel,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Notification {
    pub fn from_event(event: &SupervisorEvent, severity: AlertLevel) -> Self {
        Self {
            kind: event.kind,
            target: event.target.clone(),
            message: event.message.clone(),
            timestamp: event.timestamp,
            severity,
            details: event.details.clone(),
        }
    }
}

/// A notification channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Backend name used in logs
    fn kind(&self) -> &'static str;

    async fn notify(&self, notification: &Notification) -> Result<()>;
}
