//! External command execution shared by checks, actions and hooks.

use crate::error::CommandError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

/// Deadline carried through a check pass or a remediation attempt.
/// Every child process started under it is killed once it passes.
#[derive(Debug, Clone, Copy)]
pub struct ExecContext {
    deadline: Instant,
}

impl ExecContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Exit status and captured stdout followed by stderr
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// None when the process was terminated by a signal
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code for reporting; -1 when terminated by a signal
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

/// Run `argv[0]` with the remaining arguments, without a shell.
pub async fn run_captured<S: AsRef<str>>(
    argv: &[S],
    ctx: &ExecContext,
) -> Result<CommandOutput, CommandError> {
    let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
    let program = program.as_ref();
    if program.is_empty() {
        return Err(CommandError::Empty);
    }

    let started = Instant::now();
    let child = Command::new(program)
        .args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    match tokio::time::timeout_at(ctx.deadline(), child.wait_with_output()).await {
        Ok(Ok(out)) => {
            let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
            output.push_str(&String::from_utf8_lossy(&out.stderr));
            Ok(CommandOutput {
                code: out.status.code(),
                output,
            })
        }
        Ok(Err(source)) => Err(CommandError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(CommandError::TimedOut {
            program: program.to_string(),
            elapsed: started.elapsed(),
        }),
    }
}

/// Cut `text` to at most `max` characters, marking the cut with "..."
pub fn truncate_output(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
