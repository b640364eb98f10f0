use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use crate::config::Target;
use crate::supervisor::StateSnapshot;

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Self-healing process supervisor", long_about = None)]
pub struct Cli {
    /// Config file path (.yaml, .yml, .json or .toml)
    #[arg(short, long, env = "VIGIL_CONFIG", default_value = "/etc/vigil/config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the supervisor until SIGINT/SIGTERM
    Run,
    /// Run a single pass; exit status 0 when every target is healthy
    Check,
    /// Validate the configuration and print the resolved targets
    Validate,
    /// Print the persisted state snapshot
    Status,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "TARGET")]
    name: String,
    #[tabled(rename = "ENABLED")]
    enabled: bool,
    #[tabled(rename = "CHECKS")]
    checks: String,
    #[tabled(rename = "ACTION")]
    action: String,
    #[tabled(rename = "THRESHOLD")]
    fail_threshold: u32,
    #[tabled(rename = "COOLDOWN")]
    cooldown: String,
    #[tabled(rename = "MAX/HOUR")]
    max_restarts_per_hour: u32,
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "TARGET")]
    name: String,
    #[tabled(rename = "HEALTHY")]
    healthy: String,
    #[tabled(rename = "FAILURES")]
    consecutive_failures: u32,
    #[tabled(rename = "LAST CHECK")]
    last_check: String,
    #[tabled(rename = "LAST RESTART")]
    last_restart: String,
    #[tabled(rename = "RESTARTS/1H")]
    restarts: usize,
    #[tabled(rename = "MESSAGE")]
    message: String,
}

fn action_summary(target: &Target) -> String {
    use crate::config::ActionKind;

    let base = match &target.action.kind {
        ActionKind::Exec { exec } if !exec.start.is_empty() && !exec.restart.is_empty() => {
            "exec:start+restart".to_string()
        }
        ActionKind::Exec { exec } if !exec.restart.is_empty() => "exec:restart".to_string(),
        ActionKind::Exec { .. } => "exec:start".to_string(),
        ActionKind::Systemd { systemd } => format!(
            "systemd:{} {}",
            systemd.method.as_deref().unwrap_or("restart"),
            systemd.unit
        ),
    };
    match &target.action.hooks {
        Some(hooks) if !hooks.is_empty() => format!("{} (with hooks)", base),
        _ => base,
    }
}

/// Resolved targets and policies as a table
pub fn targets_table(targets: &[Target]) -> String {
    let rows = targets.iter().map(|t| TargetRow {
        name: t.name.clone(),
        enabled: t.enabled,
        checks: t
            .checks
            .iter()
            .map(|c| c.kind())
            .collect::<Vec<_>>()
            .join(","),
        action: action_summary(t),
        fail_threshold: t.policy.fail_threshold,
        cooldown: format!("{}s", t.policy.restart_cooldown_seconds),
        max_restarts_per_hour: t.policy.max_restarts_per_hour,
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Persisted target states as a table
pub fn state_table(snapshot: &StateSnapshot) -> String {
    let now = chrono::Utc::now();
    let rows = snapshot.targets.values().map(|s| StateRow {
        name: s.name.clone(),
        healthy: if s.is_healthy { "yes" } else { "NO" }.to_string(),
        consecutive_failures: s.consecutive_failures,
        last_check: s
            .last_check_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string()),
        last_restart: s
            .last_restart_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string()),
        restarts: s.recent_restarts(now),
        message: s
            .last_message
            .as_deref()
            .map(|m| crate::command::truncate_output(m, 60))
            .unwrap_or_default(),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}
