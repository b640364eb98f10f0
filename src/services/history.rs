//! Event history and per-target statistics

use crate::config::HistoryConfig;
use crate::error::{Result, VigilError};
use crate::supervisor::{EventKind, EventSink, SupervisorEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Aggregated counters for one target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetStats {
    pub total_checks: u64,
    pub failed_checks: u64,
    pub successful_checks: u64,
    pub total_recoveries: u64,
    pub failed_recoveries: u64,
    #[serde(default)]
    pub last_check_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_recovery_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryLog {
    #[serde(default)]
    events: Vec<SupervisorEvent>,
    #[serde(default)]
    stats: BTreeMap<String, TargetStats>,
}

/// Records every supervisor event, keeping a bounded log and running stats.
pub struct HistoryRecorder {
    path: Option<PathBuf>,
    max_entries: usize,
    retention: chrono::Duration,
    log: Mutex<HistoryLog>,
}

impl HistoryRecorder {
    /// Open the recorder, reloading persisted history when `config.path` is set.
    /// Unreadable history is logged and replaced by an empty log.
    pub async fn open(config: &HistoryConfig) -> Self {
        let recorder = Self {
            path: config.path.clone(),
            max_entries: config.max_entries(),
            retention: config.retention(),
            log: Mutex::new(HistoryLog::default()),
        };

        if let Err(e) = recorder.load().await {
            warn!(error = %e, "failed to load history");
        }
        recorder
    }

    async fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let loaded: HistoryLog = serde_json::from_slice(&data)?;
        info!(events = loaded.events.len(), targets = loaded.stats.len(), "history loaded");
        *self.log.lock().await = loaded;
        Ok(())
    }

    /// Record one event, then persist when a path is configured
    pub async fn record(&self, event: SupervisorEvent) -> Result<()> {
        let mut log = self.log.lock().await;

        let stats = log.stats.entry(event.target.clone()).or_default();
        stats.last_check_time = Some(event.timestamp);
        match event.kind {
            EventKind::CheckFailed => {
                stats.total_checks += 1;
                stats.failed_checks += 1;
                stats.consecutive_failures += 1;
                stats.last_failure_time = Some(event.timestamp);
            }
            EventKind::CheckPassed => {
                stats.total_checks += 1;
                stats.successful_checks += 1;
                stats.consecutive_failures = 0;
            }
            EventKind::RecoverySuccess => {
                stats.total_recoveries += 1;
                stats.last_recovery_time = Some(event.timestamp);
                stats.consecutive_failures = 0;
            }
            EventKind::RecoveryFailed => {
                stats.failed_recoveries += 1;
            }
        }

        log.events.push(event);

        let cutoff = Utc::now() - self.retention;
        log.events.retain(|e| e.timestamp > cutoff);
        if log.events.len() > self.max_entries {
            let excess = log.events.len() - self.max_entries;
            log.events.drain(..excess);
        }

        if let Some(path) = &self.path {
            persist(path, &log).await?;
        }
        Ok(())
    }

    /// Most recent events, oldest first, optionally for one target. `limit` 0 means all.
    pub async fn events(&self, target: Option<&str>, limit: usize) -> Vec<SupervisorEvent> {
        let log = self.log.lock().await;
        let filtered: Vec<&SupervisorEvent> = log
            .events
            .iter()
            .filter(|e| target.map_or(true, |t| e.target == t))
            .collect();

        let skip = if limit > 0 && limit < filtered.len() {
            filtered.len() - limit
        } else {
            0
        };
        filtered.into_iter().skip(skip).cloned().collect()
    }

    /// Stats for one target (zeroes when unknown)
    pub async fn stats(&self, target: &str) -> TargetStats {
        self.log
            .lock()
            .await
            .stats
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Counter totals across all targets
    pub async fn aggregate_stats(&self) -> TargetStats {
        let log = self.log.lock().await;
        log.stats.values().fold(TargetStats::default(), |mut total, s| {
            total.total_checks += s.total_checks;
            total.failed_checks += s.failed_checks;
            total.successful_checks += s.successful_checks;
            total.total_recoveries += s.total_recoveries;
            total.failed_recoveries += s.failed_recoveries;
            total
        })
    }

    pub async fn all_stats(&self) -> BTreeMap<String, TargetStats> {
        self.log.lock().await.stats.clone()
    }
}

async fn persist(path: &Path, log: &HistoryLog) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let data = serde_json::to_vec_pretty(log)?;
    let tmp = crate::supervisor::state::tmp_path(path);
    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| VigilError::State(format!("failed to persist history: {}", e)))
}

#[async_trait]
impl EventSink for HistoryRecorder {
    fn name(&self) -> &'static str {
        "history"
    }

    async fn deliver(&self, event: &SupervisorEvent) -> Result<()> {
        self.record(event.clone()).await
    }
}
