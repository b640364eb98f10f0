//! Remediation actions
//!
//! An [`Action`] is built fresh for every remediation attempt by
//! [`Action::from_spec`], because the exec variant picks its command based
//! on whether this is the first attempt of a failure episode.

mod exec;
mod hooks;

pub use exec::{ExecAction, ExecMode, SystemdAction};
pub use hooks::{split_hook, HookedAction};

use crate::command::ExecContext;
use crate::config::{ActionKind, ActionSpec};
use crate::error::{Result, VigilError};
use std::time::Duration;
use tracing::debug;

/// Truncation limit for command output embedded in action messages
pub const ACTION_OUTPUT_LIMIT: usize = 300;

/// Outcome of one remediation attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub latency: Duration,
}

/// The remediation itself, without hooks
#[derive(Debug, Clone)]
pub enum BaseAction {
    Exec(ExecAction),
    Systemd(SystemdAction),
}

impl BaseAction {
    pub fn describe(&self) -> String {
        match self {
            BaseAction::Exec(a) => format!("exec:{}", a.mode()),
            BaseAction::Systemd(a) => format!("systemd:{} {}", a.method(), a.unit()),
        }
    }

    pub async fn execute(&self, ctx: &ExecContext) -> ActionResult {
        match self {
            BaseAction::Exec(a) => a.execute(ctx).await,
            BaseAction::Systemd(a) => a.execute(ctx).await,
        }
    }
}

/// A constructed remediation, optionally wrapped with hooks
#[derive(Debug, Clone)]
pub enum Action {
    Plain(BaseAction),
    Hooked(HookedAction),
}

impl Action {
    /// Build the action for one attempt. `is_first_failure` selects the exec
    /// `start` command over `restart` when both are configured.
    pub fn from_spec(spec: &ActionSpec, is_first_failure: bool) -> Result<Self> {
        let base = match &spec.kind {
            ActionKind::Exec { exec } => {
                let (mode, argv) = if is_first_failure && !exec.start.is_empty() {
                    (ExecMode::Start, &exec.start)
                } else if !exec.restart.is_empty() {
                    (ExecMode::Restart, &exec.restart)
                } else if !exec.start.is_empty() {
                    (ExecMode::Start, &exec.start)
                } else {
                    return Err(VigilError::InvalidAction(
                        "no command defined in exec action".to_string(),
                    ));
                };
                BaseAction::Exec(ExecAction::new(mode, argv.clone()))
            }
            ActionKind::Systemd { systemd } => {
                if systemd.unit.is_empty() {
                    return Err(VigilError::InvalidAction(
                        "systemd action requires unit".to_string(),
                    ));
                }
                let method = systemd
                    .method
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "restart".to_string());
                BaseAction::Systemd(SystemdAction::new(&systemd.unit, &method))
            }
        };

        debug!(action = %base.describe(), is_first_failure, "built remediation action");

        Ok(match &spec.hooks {
            Some(hooks) if !hooks.is_empty() => {
                Action::Hooked(HookedAction::new(base, hooks.clone()))
            }
            _ => Action::Plain(base),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            Action::Plain(base) => base.describe(),
            Action::Hooked(hooked) => format!("{} (with hooks)", hooked.base().describe()),
        }
    }

    pub async fn execute(&self, ctx: &ExecContext) -> ActionResult {
        match self {
            Action::Plain(base) => base.execute(ctx).await,
            Action::Hooked(hooked) => hooked.execute(ctx).await,
        }
    }
}
