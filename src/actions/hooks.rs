use super::{ActionResult, BaseAction};
use crate::command::{run_captured, truncate_output, ExecContext};
use crate::config::ActionHooks;
use tracing::{debug, warn};

/// Wraps a base action with before/after/on-failure hooks. Hook failures
/// are logged and never change the result of the wrapped action.
#[derive(Debug, Clone)]
pub struct HookedAction {
    base: BaseAction,
    hooks: ActionHooks,
}

impl HookedAction {
    pub fn new(base: BaseAction, hooks: ActionHooks) -> Self {
        Self { base, hooks }
    }

    pub fn base(&self) -> &BaseAction {
        &self.base
    }

    pub async fn execute(&self, ctx: &ExecContext) -> ActionResult {
        run_hooks("before_restart", &self.hooks.before_restart, ctx).await;

        let result = self.base.execute(ctx).await;

        if result.success {
            run_hooks("after_restart", &self.hooks.after_restart, ctx).await;
        } else {
            run_hooks("on_failure", &self.hooks.on_failure, ctx).await;
        }

        result
    }
}

async fn run_hooks(stage: &str, commands: &[String], ctx: &ExecContext) {
    if commands.is_empty() {
        return;
    }
    debug!(stage, count = commands.len(), "executing hooks");

    for command in commands {
        if let Err(e) = run_hook(command, ctx).await {
            warn!(stage, command = %command, error = %e, "hook failed");
        }
    }
}

async fn run_hook(command: &str, ctx: &ExecContext) -> Result<(), String> {
    let argv = split_hook(command);
    if argv.is_empty() {
        return Err("empty hook command".to_string());
    }

    let out = run_captured(&argv, ctx).await.map_err(|e| e.to_string())?;
    if out.success() {
        Ok(())
    } else {
        Err(format!(
            "exit code {}: {}",
            out.exit_code(),
            truncate_output(&out.output, super::ACTION_OUTPUT_LIMIT)
        ))
    }
}

/// Split a hook command line on whitespace. No quoting is recognised.
pub fn split_hook(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
