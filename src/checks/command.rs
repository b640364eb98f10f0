use super::{CheckResult, CHECK_OUTPUT_LIMIT};
use crate::command::{run_captured, truncate_output, ExecContext};
use crate::config::ScriptCheckSpec;
use crate::error::{Result, VigilError};
use std::path::{Path, PathBuf};
use tokio::time::Instant;

const COMMAND: &str = "command";
const SCRIPT: &str = "script";

/// Passes when the command exits 0
#[derive(Debug, Clone)]
pub struct CommandChecker {
    argv: Vec<String>,
}

impl CommandChecker {
    pub fn new(argv: &[String]) -> Result<Self> {
        if argv.is_empty() || argv[0].is_empty() {
            return Err(VigilError::InvalidCheck(
                "command check requires command".to_string(),
            ));
        }
        Ok(Self {
            argv: argv.to_vec(),
        })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub async fn check(&self, ctx: &ExecContext) -> CheckResult {
        let started = Instant::now();

        match run_captured(&self.argv, ctx).await {
            Ok(out) if out.success() => CheckResult::pass(COMMAND, started, "command succeeded"),
            Ok(out) => CheckResult::fail(
                COMMAND,
                started,
                format!(
                    "command failed: exit code {} (output: {})",
                    out.exit_code(),
                    truncate_output(&out.output, CHECK_OUTPUT_LIMIT)
                ),
            ),
            Err(e) => CheckResult::fail(COMMAND, started, format!("command failed: {}", e)),
        }
    }
}

/// Runs an external script and classifies its exit code
#[derive(Debug, Clone)]
pub struct ScriptChecker {
    path: PathBuf,
    args: Vec<String>,
    success_exit_codes: Vec<i32>,
    warning_exit_codes: Vec<i32>,
}

impl ScriptChecker {
    pub fn new(spec: &ScriptCheckSpec) -> Result<Self> {
        if spec.path.as_os_str().is_empty() {
            return Err(VigilError::InvalidCheck(
                "script check requires path".to_string(),
            ));
        }

        let success_exit_codes = if spec.success_exit_codes.is_empty() {
            vec![0]
        } else {
            spec.success_exit_codes.clone()
        };

        Ok(Self {
            path: spec.path.clone(),
            args: spec.args.clone(),
            success_exit_codes,
            warning_exit_codes: spec.warning_exit_codes.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn check(&self, ctx: &ExecContext) -> CheckResult {
        let started = Instant::now();

        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.path.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());

        let out = match run_captured(&argv, ctx).await {
            Ok(out) => out,
            Err(e) => {
                return CheckResult::fail(SCRIPT, started, format!("failed to execute script: {}", e))
            }
        };

        let code = out.exit_code();
        if out.code.is_some() && self.success_exit_codes.contains(&code) {
            CheckResult::pass(
                SCRIPT,
                started,
                format!("script succeeded (exit code: {})", code),
            )
        } else if out.code.is_some() && self.warning_exit_codes.contains(&code) {
            CheckResult::pass(
                SCRIPT,
                started,
                format!("script warning (exit code: {}): {}", code, out.output.trim()),
            )
        } else {
            CheckResult::fail(
                SCRIPT,
                started,
                format!(
                    "script failed (exit code: {}): {}",
                    code,
                    truncate_output(&out.output, CHECK_OUTPUT_LIMIT)
                ),
            )
        }
    }
}
