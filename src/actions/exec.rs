use super::{ActionResult, ACTION_OUTPUT_LIMIT};
use crate::command::{run_captured, truncate_output, ExecContext};
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Start,
    Restart,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecMode::Start => write!(f, "start"),
            ExecMode::Restart => write!(f, "restart"),
        }
    }
}

/// Runs a local command to (re)start the target
#[derive(Debug, Clone)]
pub struct ExecAction {
    mode: ExecMode,
    argv: Vec<String>,
}

impl ExecAction {
    pub fn new(mode: ExecMode, argv: Vec<String>) -> Self {
        Self { mode, argv }
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub async fn execute(&self, ctx: &ExecContext) -> ActionResult {
        let started = Instant::now();

        let (success, message) = match run_captured(&self.argv, ctx).await {
            Ok(out) if out.success() => (true, "command executed successfully".to_string()),
            Ok(out) => (
                false,
                format!(
                    "command failed: exit code {} (output: {})",
                    out.exit_code(),
                    truncate_output(&out.output, ACTION_OUTPUT_LIMIT)
                ),
            ),
            Err(e) => (false, format!("command failed: {}", e)),
        };

        ActionResult {
            success,
            message,
            latency: started.elapsed(),
        }
    }
}

/// `systemctl <method> <unit>`
#[derive(Debug, Clone)]
pub struct SystemdAction {
    unit: String,
    method: String,
}

impl SystemdAction {
    pub fn new(unit: &str, method: &str) -> Self {
        Self {
            unit: unit.to_string(),
            method: method.to_string(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn execute(&self, ctx: &ExecContext) -> ActionResult {
        let started = Instant::now();
        let argv = ["systemctl", self.method.as_str(), self.unit.as_str()];

        let (success, message) = match run_captured(&argv, ctx).await {
            Ok(out) if out.success() => (
                true,
                format!("systemctl {} {} succeeded", self.method, self.unit),
            ),
            Ok(out) => (
                false,
                format!(
                    "systemctl {} {} failed: exit code {} (output: {})",
                    self.method,
                    self.unit,
                    out.exit_code(),
                    truncate_output(&out.output, ACTION_OUTPUT_LIMIT)
                ),
            ),
            Err(e) => (
                false,
                format!("systemctl {} {} failed: {}", self.method, self.unit, e),
            ),
        };

        ActionResult {
            success,
            message,
            latency: started.elapsed(),
        }
    }
}
