//! Per-target health state and its JSON snapshot

use crate::error::{Result, VigilError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Health and remediation bookkeeping for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub name: String,
    pub consecutive_failures: u32,
    pub is_healthy: bool,
    #[serde(default)]
    pub last_check_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_restart_time: Option<DateTime<Utc>>,
    /// Successful remediation times, pruned to the trailing hour on each attempt
    #[serde(default)]
    pub restarts_in_last_hour: Vec<DateTime<Utc>>,
    /// Most recent failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

impl TargetState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            consecutive_failures: 0,
            is_healthy: true,
            last_check_time: None,
            last_restart_time: None,
            restarts_in_last_hour: Vec::new(),
            last_message: None,
        }
    }

    /// Restarts still inside the trailing hour, without pruning
    pub fn recent_restarts(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - chrono::Duration::hours(1);
        self.restarts_in_last_hour
            .iter()
            .filter(|t| **t > window_start)
            .count()
    }
}

/// On-disk form: `{"targets": {"<name>": {...}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetState>,
}

/// JSON file holding the last [`StateSnapshot`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file is `Ok(None)`; unreadable or malformed content is an error.
    pub async fn load(&self) -> Result<Option<StateSnapshot>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VigilError::State(format!(
                    "error reading state file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let snapshot = serde_json::from_slice(&data).map_err(|e| {
            VigilError::State(format!(
                "error parsing state file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(snapshot))
    }

    /// Write through a temp file and rename, so readers never see a partial file
    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), targets = snapshot.targets.len(), "state saved");
        Ok(())
    }
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_no_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = StateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, VigilError::State(_)));
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested").join("state.json"));

        let now = Utc::now();
        let mut web = TargetState::new("web");
        web.consecutive_failures = 3;
        web.is_healthy = false;
        web.last_check_time = Some(now);
        web.last_restart_time = Some(now - chrono::Duration::minutes(5));
        web.restarts_in_last_hour = vec![now - chrono::Duration::minutes(5)];
        web.last_message = Some("connection refused".to_string());

        let mut snapshot = StateSnapshot::default();
        snapshot.targets.insert("web".to_string(), web);
        snapshot.targets.insert("db".to_string(), TargetState::new("db"));

        store.save(&snapshot).await.unwrap();
        assert!(!tmp_path(store.path()).exists());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_recent_restarts_counts_trailing_hour() {
        let now = Utc::now();
        let mut state = TargetState::new("t");
        state.restarts_in_last_hour = vec![
            now - chrono::Duration::minutes(90),
            now - chrono::Duration::minutes(30),
            now,
        ];
        assert_eq!(state.recent_restarts(now), 2);
    }
}
