//! Alert Manager for outbound notifications
//!
//! Maps supervisor events to severities, filters them per channel and
//! suppresses repeats so a flapping target does not flood a channel.

use super::events::{EventKind, EventSink, SupervisorEvent};
use crate::adapters::{EmailNotifier, Notification, Notifier, TelegramNotifier, WebhookNotifier};
use crate::config::{NotificationChannel, NotificationConfig};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Severity of a supervisor event
    pub fn for_event(kind: EventKind) -> Self {
        match kind {
            EventKind::CheckFailed => AlertLevel::Warning,
            EventKind::RecoveryFailed => AlertLevel::Critical,
            EventKind::CheckPassed | EventKind::RecoverySuccess => AlertLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rate limiter state for an alert key
#[derive(Debug)]
struct RateLimitState {
    last_sent: DateTime<Utc>,
    suppressed_count: u32,
}

/// One configured notifier with its filters
struct Channel {
    notifier: Arc<dyn Notifier>,
    min_level: AlertLevel,
    suppress_repeat_secs: u64,
    rate_limits: RwLock<HashMap<(String, EventKind), RateLimitState>>,
}

impl Channel {
    /// True when this (target, kind) pair was sent within the suppression window
    async fn should_suppress(&self, event: &SupervisorEvent) -> bool {
        if self.suppress_repeat_secs == 0 {
            return false;
        }
        let key = (event.target.clone(), event.kind);
        let now = event.timestamp;

        let mut limits = self.rate_limits.write().await;
        if let Some(state) = limits.get_mut(&key) {
            let elapsed = now.signed_duration_since(state.last_sent).num_seconds();
            if elapsed < self.suppress_repeat_secs as i64 {
                state.suppressed_count += 1;
                debug!(
                    channel = self.notifier.kind(),
                    target = %event.target,
                    kind = %event.kind,
                    suppressed = state.suppressed_count,
                    "suppressing repeated notification"
                );
                return true;
            }
            state.last_sent = now;
            state.suppressed_count = 0;
        } else {
            limits.insert(
                key,
                RateLimitState {
                    last_sent: now,
                    suppressed_count: 0,
                },
            );
        }
        false
    }
}

/// Alert Manager: an [`EventSink`] that forwards events to notification channels
#[derive(Default)]
pub struct AlertManager {
    channels: Vec<Channel>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every enabled channel from configuration
    pub fn from_config(configs: &[NotificationConfig]) -> Result<Self> {
        let mut manager = Self::new();
        for config in configs.iter().filter(|c| c.enabled) {
            let notifier: Arc<dyn Notifier> = match &config.channel {
                NotificationChannel::Webhook { webhook } => Arc::new(WebhookNotifier::new(webhook)?),
                NotificationChannel::Telegram { telegram } => {
                    Arc::new(TelegramNotifier::new(telegram)?)
                }
                NotificationChannel::Email { email } => Arc::new(EmailNotifier::new(email)?),
            };
            info!(channel = config.channel.kind(), "notification channel enabled");
            manager = manager.with_channel(
                notifier,
                config.min_severity.unwrap_or(AlertLevel::Info),
                config.suppress_repeat_seconds,
            );
        }
        Ok(manager)
    }

    pub fn with_channel(
        mut self,
        notifier: Arc<dyn Notifier>,
        min_level: AlertLevel,
        suppress_repeat_secs: u64,
    ) -> Self {
        self.channels.push(Channel {
            notifier,
            min_level,
            suppress_repeat_secs,
            rate_limits: RwLock::new(HashMap::new()),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send to every channel that accepts the event, concurrently
    pub async fn alert(&self, event: &SupervisorEvent) {
        let level = AlertLevel::for_event(event.kind);
        let notification = Notification::from_event(event, level);

        let mut sends = Vec::new();
        for channel in &self.channels {
            if level < channel.min_level || channel.should_suppress(event).await {
                continue;
            }
            let notification = &notification;
            sends.push(async move {
                (
                    channel.notifier.kind(),
                    channel.notifier.notify(notification).await,
                )
            });
        }

        for (kind, result) in join_all(sends).await {
            if let Err(e) = result {
                error!(
                    channel = kind,
                    target = %event.target,
                    error = %e,
                    "notification failed"
                );
            }
        }
    }

    /// Suppressed counts per (target, kind) across channels
    pub async fn suppressed_counts(&self) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for channel in &self.channels {
            for ((target, kind), state) in channel.rate_limits.read().await.iter() {
                if state.suppressed_count > 0 {
                    *counts.entry(format!("{}:{}", target, kind)).or_insert(0) +=
                        state.suppressed_count;
                }
            }
        }
        counts
    }
}

#[async_trait]
impl EventSink for AlertManager {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn deliver(&self, event: &SupervisorEvent) -> Result<()> {
        self.alert(event).await;
        Ok(())
    }
}
