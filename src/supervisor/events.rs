//! Supervisor events and their fan-out to collaborators

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What happened to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CheckFailed,
    CheckPassed,
    RecoverySuccess,
    RecoveryFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CheckFailed => "check_failed",
            EventKind::CheckPassed => "check_passed",
            EventKind::RecoverySuccess => "recovery_success",
            EventKind::RecoveryFailed => "recovery_failed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event payload delivered to every sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub target: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl SupervisorEvent {
    pub fn new(kind: EventKind, target: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
        }
    }

    /// Attach a structured detail
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// A consumer of supervisor events (notifications, history, ...)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &SupervisorEvent) -> Result<()>;
}

/// Fans events out to sinks. Each delivery runs in its own task; failures
/// are logged and never reach the caller.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Hand the event to every sink. The returned handles may be dropped.
    pub fn dispatch(&self, event: SupervisorEvent) -> Vec<JoinHandle<()>> {
        if self.sinks.is_empty() {
            return Vec::new();
        }
        debug!(kind = %event.kind, target = %event.target, sinks = self.sinks.len(), "dispatching event");

        let event = Arc::new(event);
        self.sinks
            .iter()
            .map(|sink| {
                let sink = sink.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(e) = sink.deliver(&event).await {
                        warn!(
                            sink = sink.name(),
                            kind = %event.kind,
                            target = %event.target,
                            error = %e,
                            "event delivery failed"
                        );
                    }
                })
            })
            .collect()
    }
}
