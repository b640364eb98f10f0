use super::{CheckResult, CHECK_OUTPUT_LIMIT};
use crate::command::{run_captured, truncate_output, ExecContext};
use crate::error::{Result, VigilError};
use std::path::{Path, PathBuf};
use tokio::time::Instant;

const PROCESS: &str = "process_name";
const PID_FILE: &str = "pid_file";

/// Passes when `pgrep -x <name>` finds at least one process
#[derive(Debug, Clone)]
pub struct ProcessChecker {
    process_name: String,
}

impl ProcessChecker {
    pub fn new(process_name: &str) -> Result<Self> {
        if process_name.is_empty() {
            return Err(VigilError::InvalidCheck(
                "process_name check requires process_name".to_string(),
            ));
        }
        Ok(Self {
            process_name: process_name.to_string(),
        })
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub async fn check(&self, ctx: &ExecContext) -> CheckResult {
        let started = Instant::now();

        match run_captured(&["pgrep", "-x", self.process_name.as_str()], ctx).await {
            Ok(out) if out.success() => {
                let pids: Vec<&str> = out.output.split_whitespace().collect();
                CheckResult::pass(
                    PROCESS,
                    started,
                    format!(
                        "process '{}' found (PIDs: {})",
                        self.process_name,
                        pids.join(", ")
                    ),
                )
            }
            // pgrep exits 1 when nothing matched
            Ok(out) if out.code == Some(1) => CheckResult::fail(
                PROCESS,
                started,
                format!("process '{}' not found", self.process_name),
            ),
            Ok(out) => CheckResult::fail(
                PROCESS,
                started,
                format!(
                    "pgrep error: exit code {}: {}",
                    out.exit_code(),
                    truncate_output(&out.output, CHECK_OUTPUT_LIMIT)
                ),
            ),
            Err(e) => CheckResult::fail(PROCESS, started, format!("pgrep error: {}", e)),
        }
    }
}

/// Passes when the PID recorded in a file belongs to a live process
#[derive(Debug, Clone)]
pub struct PidFileChecker {
    path: PathBuf,
}

enum Liveness {
    Running,
    Gone,
}

impl PidFileChecker {
    pub fn new(path: &Path) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(VigilError::InvalidCheck(
                "pid_file check requires pid_file".to_string(),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn check(&self, _ctx: &ExecContext) -> CheckResult {
        let started = Instant::now();

        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                return CheckResult::fail(PID_FILE, started, format!("cannot read pid file: {}", e))
            }
        };

        let pid_str = content.trim();
        let pid = match pid_str.parse::<i32>() {
            Ok(pid) if pid > 0 => pid,
            _ => {
                return CheckResult::fail(
                    PID_FILE,
                    started,
                    format!("invalid PID in file: {}", pid_str),
                )
            }
        };

        match probe(pid) {
            Ok(Liveness::Running) => {
                CheckResult::pass(PID_FILE, started, format!("process {} is running", pid))
            }
            Ok(Liveness::Gone) => {
                CheckResult::fail(PID_FILE, started, format!("process {} not running", pid))
            }
            Err(e) => CheckResult::fail(
                PID_FILE,
                started,
                format!("process {} not found: {}", pid, e),
            ),
        }
    }
}

/// Zero-signal probe. EPERM means the process exists but belongs to someone else.
#[cfg(unix)]
fn probe(pid: i32) -> std::result::Result<Liveness, String> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(Liveness::Running),
        Err(Errno::ESRCH) => Ok(Liveness::Gone),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(not(unix))]
fn probe(_pid: i32) -> std::result::Result<Liveness, String> {
    Err("process probing is not supported on this platform".to_string())
}
