use crate::error::{Result, VigilError};
use crate::supervisor::AlertLevel;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Seconds between passes in daemon mode (0 is only valid for one-shot runs)
    #[serde(default)]
    pub interval_seconds: u64,
    /// Per-target bound on check execution, and per-attempt bound on remediation
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// DEBUG, INFO, WARN or ERROR (RUST_LOG takes precedence when set)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for the daily rolling log file
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,
    /// Target state snapshot location
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub default_policy: PolicyConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,
    #[serde(default)]
    pub history: Option<HistoryConfig>,
    #[serde(default)]
    pub status: StatusConfig,
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Remediation policy as written in the configuration file. Absent or zero
/// values fall back to the default policy field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub fail_threshold: Option<u32>,
    #[serde(default)]
    pub restart_cooldown_seconds: Option<u64>,
    #[serde(default)]
    pub max_restarts_per_hour: Option<u32>,
    /// Reserved: parsed and reported, never consulted by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_strategy: Option<String>,
    /// Reserved: parsed and reported, never consulted by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_seconds: Option<u64>,
}

impl PolicyConfig {
    /// Fill every absent or zero field from `fallback`
    pub fn resolve(&self, fallback: &Policy) -> Policy {
        Policy {
            fail_threshold: non_zero(self.fail_threshold).unwrap_or(fallback.fail_threshold),
            restart_cooldown_seconds: non_zero(self.restart_cooldown_seconds)
                .unwrap_or(fallback.restart_cooldown_seconds),
            max_restarts_per_hour: non_zero(self.max_restarts_per_hour)
                .unwrap_or(fallback.max_restarts_per_hour),
            backoff_strategy: self
                .backoff_strategy
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| fallback.backoff_strategy.clone()),
            max_backoff_seconds: non_zero(self.max_backoff_seconds)
                .or(fallback.max_backoff_seconds),
        }
    }
}

fn non_zero<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

/// Fully resolved remediation policy; every active field is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub fail_threshold: u32,
    pub restart_cooldown_seconds: u64,
    pub max_restarts_per_hour: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_seconds: Option<u64>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fail_threshold: 1,
            restart_cooldown_seconds: 60,
            max_restarts_per_hour: 10,
            backoff_strategy: None,
            max_backoff_seconds: None,
        }
    }
}

impl Policy {
    pub fn restart_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.restart_cooldown_seconds as i64)
    }
}

/// A supervised service as written in the configuration file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    pub action: ActionSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyConfig>,
}

impl TargetConfig {
    /// Validate this target, returning every problem found
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let name = if self.name.trim().is_empty() {
            errors.push("target name is required".to_string());
            "<unnamed>"
        } else {
            self.name.as_str()
        };

        if self.checks.is_empty() {
            errors.push(format!("target[{}]: at least one check is required", name));
        }
        for (i, check) in self.checks.iter().enumerate() {
            check.validate(&format!("target[{}].checks[{}]", name, i), &mut errors);
        }
        self.action
            .validate(&format!("target[{}].action", name), &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Produce the engine-facing target with its policy resolved against `default_policy`
    pub fn resolve(&self, default_policy: &Policy) -> Target {
        let policy = match &self.policy {
            Some(p) => p.resolve(default_policy),
            None => default_policy.clone(),
        };
        Target {
            name: self.name.clone(),
            enabled: self.enabled,
            checks: self.checks.clone(),
            action: self.action.clone(),
            policy,
        }
    }
}

/// A supervised service with its effective policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub name: String,
    pub enabled: bool,
    pub checks: Vec<CheckSpec>,
    pub action: ActionSpec,
    pub policy: Policy,
}

/// Health check specification, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    ProcessName {
        process_name: String,
        /// Reserved: parsed but not consulted
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        ignore_exit_codes: Vec<i32>,
    },
    PidFile {
        pid_file: PathBuf,
    },
    TcpPort {
        #[serde(deserialize_with = "string_or_number")]
        tcp_port: String,
    },
    Command {
        command: Vec<String>,
    },
    Http {
        http: HttpCheckSpec,
    },
    Script {
        script: ScriptCheckSpec,
    },
    Logic {
        logic: String,
        #[serde(default)]
        checks: Vec<CheckSpec>,
    },
}

impl CheckSpec {
    /// Configuration tag of this check
    pub fn kind(&self) -> &'static str {
        match self {
            CheckSpec::ProcessName { .. } => "process_name",
            CheckSpec::PidFile { .. } => "pid_file",
            CheckSpec::TcpPort { .. } => "tcp_port",
            CheckSpec::Command { .. } => "command",
            CheckSpec::Http { .. } => "http",
            CheckSpec::Script { .. } => "script",
            CheckSpec::Logic { .. } => "logic",
        }
    }

    fn validate(&self, path: &str, errors: &mut Vec<String>) {
        match self {
            CheckSpec::ProcessName { process_name, .. } if process_name.is_empty() => {
                errors.push(format!("{}: process_name is required for type 'process_name'", path))
            }
            CheckSpec::PidFile { pid_file } if pid_file.as_os_str().is_empty() => {
                errors.push(format!("{}: pid_file is required for type 'pid_file'", path))
            }
            CheckSpec::TcpPort { tcp_port } if tcp_port.is_empty() => {
                errors.push(format!("{}: tcp_port is required for type 'tcp_port'", path))
            }
            CheckSpec::Command { command } if command.is_empty() => {
                errors.push(format!("{}: command is required for type 'command'", path))
            }
            CheckSpec::Http { http } if http.url.is_empty() => {
                errors.push(format!("{}: http.url is required for type 'http'", path))
            }
            CheckSpec::Script { script } if script.path.as_os_str().is_empty() => {
                errors.push(format!("{}: script.path is required for type 'script'", path))
            }
            CheckSpec::Logic { logic, checks } => {
                if logic != "AND" && logic != "OR" {
                    errors.push(format!("{}: logic must be 'AND' or 'OR', got '{}'", path, logic));
                }
                if checks.is_empty() {
                    errors.push(format!("{}: logic groups must have at least one check", path));
                }
                for (i, nested) in checks.iter().enumerate() {
                    nested.validate(&format!("{}.checks[{}]", path, i), errors);
                }
            }
            _ => {}
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpCheckSpec {
    pub url: String,
    /// Default: GET
    #[serde(default)]
    pub method: Option<String>,
    /// Default: 200
    #[serde(default)]
    pub expected_status: Option<u16>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Default: 5
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScriptCheckSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Default: [0]
    #[serde(default)]
    pub success_exit_codes: Vec<i32>,
    #[serde(default)]
    pub warning_exit_codes: Vec<i32>,
}

/// Remediation specification: the action variant plus optional hooks
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActionSpec {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<ActionHooks>,
}

impl ActionSpec {
    fn validate(&self, path: &str, errors: &mut Vec<String>) {
        match &self.kind {
            ActionKind::Exec { exec } => {
                if exec.start.is_empty() && exec.restart.is_empty() {
                    errors.push(format!(
                        "{}: at least one of 'start' or 'restart' must be defined",
                        path
                    ));
                }
            }
            ActionKind::Systemd { systemd } => {
                if systemd.unit.is_empty() {
                    errors.push(format!("{}: systemd.unit is required", path));
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Exec { exec: ExecActionSpec },
    Systemd { systemd: SystemdActionSpec },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecActionSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restart: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SystemdActionSpec {
    pub unit: String,
    /// Default: restart
    #[serde(default)]
    pub method: Option<String>,
}

/// Auxiliary commands run around a remediation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActionHooks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_restart: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_restart: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,
}

impl ActionHooks {
    pub fn is_empty(&self) -> bool {
        self.before_restart.is_empty() && self.after_restart.is_empty() && self.on_failure.is_empty()
    }
}

/// One notification channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(flatten)]
    pub channel: NotificationChannel,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Events below this severity are not sent on this channel
    #[serde(default)]
    pub min_severity: Option<AlertLevel>,
    /// Identical (target, event) notifications within this window are dropped (0 = off)
    #[serde(default)]
    pub suppress_repeat_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannel {
    Webhook { webhook: WebhookConfig },
    Telegram { telegram: TelegramConfig },
    Email { email: EmailConfig },
}

impl NotificationChannel {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationChannel::Webhook { .. } => "webhook",
            NotificationChannel::Telegram { .. } => "telegram",
            NotificationChannel::Email { .. } => "email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Default: POST
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Default: 10
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Default: https://api.telegram.org
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    /// Default: 587
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    /// Implicit TLS on connect. Otherwise STARTTLS is used when the server offers it.
    #[serde(default)]
    pub use_tls: bool,
}

impl EmailConfig {
    pub fn port(&self) -> u16 {
        self.smtp_port.filter(|p| *p != 0).unwrap_or(587)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Where the event log and statistics are persisted
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Default: 1000
    #[serde(default)]
    pub max_entries: usize,
    /// Default: 168 (7 days)
    #[serde(default)]
    pub retention_hours: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: 1000,
            retention_hours: 168,
        }
    }
}

impl HistoryConfig {
    pub fn max_entries(&self) -> usize {
        if self.max_entries == 0 {
            1000
        } else {
            self.max_entries
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        let hours = if self.retention_hours == 0 { 168 } else { self.retention_hours };
        chrono::Duration::hours(hours as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_bind")]
    pub bind: String,
    #[serde(default = "default_status_port")]
    pub port: u16,
    /// HTTP Basic credentials required on `/api/*` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<StatusAuth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusAuth {
    pub username: String,
    pub password: String,
}

fn default_status_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_status_port() -> u16 {
    9100
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_status_bind(),
            port: default_status_port(),
            auth: None,
        }
    }
}

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARN", "ERROR"];

impl AppConfig {
    /// Load configuration from a file plus `VIGIL_*` environment overrides
    /// (e.g. `VIGIL_TIMEOUT_SECONDS`, `VIGIL_STATUS__PORT`).
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = format_for(path)?;

        let cfg: AppConfig = Config::builder()
            .add_source(File::from(path).format(format).required(true))
            .add_source(
                Environment::with_prefix("VIGIL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        cfg.validate()
            .map_err(|errors| VigilError::Validation(errors.join("; ")))?;
        Ok(cfg)
    }

    /// Parse configuration from an in-memory document, without environment overrides
    pub fn parse(contents: &str, format: FileFormat) -> Result<Self> {
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(contents, format))
            .build()?
            .try_deserialize()?;

        cfg.validate()
            .map_err(|errors| VigilError::Validation(errors.join("; ")))?;
        Ok(cfg)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            errors.push(format!(
                "invalid log_level: {} (must be DEBUG, INFO, WARN, or ERROR)",
                self.log_level
            ));
        }

        if self.targets.is_empty() {
            errors.push("no targets defined".to_string());
        }

        let mut seen = HashSet::new();
        for (i, target) in self.targets.iter().enumerate() {
            if !target.name.is_empty() && !seen.insert(target.name.as_str()) {
                errors.push(format!("target[{}]: duplicate target name '{}'", i, target.name));
            }
            if let Err(mut target_errors) = target.validate() {
                if target.name.trim().is_empty() {
                    target_errors = target_errors
                        .into_iter()
                        .map(|e| format!("target[{}]: {}", i, e))
                        .collect();
                }
                errors.extend(target_errors);
            }
        }

        for (i, notification) in self.notifications.iter().enumerate() {
            match &notification.channel {
                NotificationChannel::Webhook { webhook } if webhook.url.is_empty() => {
                    errors.push(format!("notifications[{}]: webhook.url is required", i));
                }
                NotificationChannel::Telegram { telegram }
                    if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() =>
                {
                    errors.push(format!(
                        "notifications[{}]: telegram.bot_token and telegram.chat_id are required",
                        i
                    ));
                }
                NotificationChannel::Email { email } => {
                    if email.smtp_host.is_empty() {
                        errors.push(format!("notifications[{}]: email.smtp_host is required", i));
                    }
                    if email.from.is_empty() {
                        errors.push(format!("notifications[{}]: email.from is required", i));
                    }
                    if email.to.is_empty() {
                        errors.push(format!(
                            "notifications[{}]: email.to needs at least one recipient",
                            i
                        ));
                    }
                }
                _ => {}
            }
        }

        if let Some(auth) = &self.status.auth {
            if auth.username.is_empty() || auth.password.is_empty() {
                errors.push("status.auth.username and status.auth.password are required".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Default policy with built-in values filled in
    pub fn default_policy(&self) -> Policy {
        self.default_policy.resolve(&Policy::default())
    }

    /// All configured targets, policies resolved, in configuration order
    pub fn resolve_targets(&self) -> Vec<Target> {
        let default_policy = self.default_policy();
        self.targets
            .iter()
            .map(|t| t.resolve(&default_policy))
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_seconds == 0 {
            default_timeout_seconds()
        } else {
            self.timeout_seconds
        };
        Duration::from_secs(secs)
    }

    /// Filter directive for the configured level
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARN" => "warn",
            "ERROR" => "error",
            _ => "info",
        }
    }
}

fn format_for(path: &Path) -> Result<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "json" => Ok(FileFormat::Json),
        "toml" => Ok(FileFormat::Toml),
        other => Err(VigilError::Validation(format!(
            "unsupported config file format: '{}' (use .yaml, .yml, .json or .toml)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
interval_seconds: 15
timeout_seconds: 5
state_file: /tmp/vigil-state.json
default_policy:
  fail_threshold: 2
  restart_cooldown_seconds: 120
targets:
  - name: web
    checks:
      - type: tcp_port
        tcp_port: 8080
      - type: http
        http:
          url: http://127.0.0.1:8080/health
          expected_status: 204
      - type: logic
        logic: OR
        checks:
          - type: process_name
            process_name: nginx
          - type: pid_file
            pid_file: /run/nginx.pid
    action:
      type: systemd
      systemd:
        unit: nginx.service
      hooks:
        before_restart:
          - logger restarting nginx
    policy:
      max_restarts_per_hour: 3
  - name: worker
    enabled: false
    checks:
      - type: script
        script:
          path: /usr/local/bin/check-worker
          warning_exit_codes: [3]
    action:
      type: exec
      exec:
        start: ["/usr/bin/worker", "--daemon"]
"#;

    #[test]
    fn test_parse_sample_config() {
        let cfg = AppConfig::parse(SAMPLE, FileFormat::Yaml).unwrap();
        assert_eq!(cfg.interval_seconds, 15);
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.targets.len(), 2);

        let web = &cfg.targets[0];
        assert!(web.enabled);
        assert_eq!(
            web.checks[0],
            CheckSpec::TcpPort {
                tcp_port: "8080".to_string()
            }
        );
        assert_eq!(web.checks[2].kind(), "logic");
        assert!(matches!(web.action.kind, ActionKind::Systemd { .. }));
        assert_eq!(
            web.action.hooks.as_ref().unwrap().before_restart,
            vec!["logger restarting nginx".to_string()]
        );

        assert!(!cfg.targets[1].enabled);
    }

    #[test]
    fn test_policy_resolution_is_field_by_field() {
        let cfg = AppConfig::parse(SAMPLE, FileFormat::Yaml).unwrap();
        let targets = cfg.resolve_targets();

        // Target overrides only max_restarts_per_hour
        assert_eq!(
            targets[0].policy,
            Policy {
                fail_threshold: 2,
                restart_cooldown_seconds: 120,
                max_restarts_per_hour: 3,
                backoff_strategy: None,
                max_backoff_seconds: None,
            }
        );
        // No target policy: default policy, built-ins fill the gaps
        assert_eq!(targets[1].policy.fail_threshold, 2);
        assert_eq!(targets[1].policy.max_restarts_per_hour, 10);
    }

    #[test]
    fn test_zero_policy_values_fall_back() {
        let policy = PolicyConfig {
            fail_threshold: Some(0),
            restart_cooldown_seconds: Some(0),
            max_restarts_per_hour: None,
            backoff_strategy: Some("exponential".to_string()),
            max_backoff_seconds: None,
        }
        .resolve(&Policy::default());

        assert_eq!(policy.fail_threshold, 1);
        assert_eq!(policy.restart_cooldown_seconds, 60);
        assert_eq!(policy.max_restarts_per_hour, 10);
        assert_eq!(policy.backoff_strategy.as_deref(), Some("exponential"));
    }

    #[test]
    fn test_validation_collects_errors() {
        let doc = r#"
log_level: LOUD
targets:
  - name: a
    checks:
      - type: logic
        logic: XOR
        checks: []
    action:
      type: exec
      exec:
        start: []
  - name: a
    checks: []
    action:
      type: systemd
      systemd:
        unit: ""
"#;
        let err = AppConfig::parse(doc, FileFormat::Yaml).unwrap_err().to_string();
        assert!(err.contains("invalid log_level"));
        assert!(err.contains("logic must be 'AND' or 'OR'"));
        assert!(err.contains("logic groups must have at least one check"));
        assert!(err.contains("at least one of 'start' or 'restart'"));
        assert!(err.contains("duplicate target name 'a'"));
        assert!(err.contains("at least one check is required"));
        assert!(err.contains("systemd.unit is required"));
    }

    #[test]
    fn test_no_targets_is_invalid() {
        let err = AppConfig::parse("interval_seconds: 5", FileFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("no targets defined"));
    }

    #[test]
    fn test_unknown_check_type_is_rejected() {
        let doc = r#"
targets:
  - name: a
    checks:
      - type: ping
    action:
      type: exec
      exec:
        restart: ["true"]
"#;
        assert!(AppConfig::parse(doc, FileFormat::Yaml).is_err());
    }

    #[test]
    fn test_defaults() {
        let doc = r#"{"targets":[{"name":"t","checks":[{"type":"command","command":["true"]}],
            "action":{"type":"exec","exec":{"restart":["true"]}}}]}"#;
        let cfg = AppConfig::parse(doc, FileFormat::Json).unwrap();
        assert_eq!(cfg.interval_seconds, 0);
        assert_eq!(cfg.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.log_filter(), "info");
        assert!(!cfg.status.enabled);
        assert_eq!(cfg.status.port, 9100);
        assert_eq!(cfg.default_policy(), Policy::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = AppConfig::load_from("/etc/vigil/config.ini").unwrap_err();
        assert!(err.to_string().contains("unsupported config file format"));
    }
}
