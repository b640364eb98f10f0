//! Health check evaluators
//!
//! Each configured check specification is turned into a [`Checker`] by
//! [`Checker::from_spec`]. Checkers only observe; they never change the
//! state of the target they look at.

mod command;
mod logic;
mod network;
mod process;

pub use command::{CommandChecker, ScriptChecker};
pub use logic::{LogicChecker, LogicOp};
pub use network::{HttpChecker, TcpChecker};
pub use process::{PidFileChecker, ProcessChecker};

use crate::command::ExecContext;
use crate::config::CheckSpec;
use crate::error::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tokio::time::Instant;

/// Truncation limit for command/script output embedded in check messages
pub const CHECK_OUTPUT_LIMIT: usize = 200;

/// Outcome of one check execution
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub success: bool,
    pub message: String,
    pub latency: Duration,
    pub check_type: &'static str,
}

impl CheckResult {
    pub(crate) fn pass(check_type: &'static str, started: Instant, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            latency: started.elapsed(),
            check_type,
        }
    }

    pub(crate) fn fail(check_type: &'static str, started: Instant, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            latency: started.elapsed(),
            check_type,
        }
    }
}

/// A constructed health check
#[derive(Debug)]
pub enum Checker {
    Process(ProcessChecker),
    PidFile(PidFileChecker),
    Tcp(TcpChecker),
    Command(CommandChecker),
    Http(HttpChecker),
    Script(ScriptChecker),
    Logic(LogicChecker),
}

impl Checker {
    /// Build a checker from its specification
    pub fn from_spec(spec: &CheckSpec) -> Result<Self> {
        Ok(match spec {
            CheckSpec::ProcessName { process_name, .. } => {
                Checker::Process(ProcessChecker::new(process_name)?)
            }
            CheckSpec::PidFile { pid_file } => Checker::PidFile(PidFileChecker::new(pid_file)?),
            CheckSpec::TcpPort { tcp_port } => Checker::Tcp(TcpChecker::new(tcp_port)?),
            CheckSpec::Command { command } => Checker::Command(CommandChecker::new(command)?),
            CheckSpec::Http { http } => Checker::Http(HttpChecker::new(http)?),
            CheckSpec::Script { script } => Checker::Script(ScriptChecker::new(script)?),
            CheckSpec::Logic { logic, checks } => Checker::Logic(LogicChecker::new(logic, checks)?),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Checker::Process(_) => "process_name",
            Checker::PidFile(_) => "pid_file",
            Checker::Tcp(_) => "tcp_port",
            Checker::Command(_) => "command",
            Checker::Http(_) => "http",
            Checker::Script(_) => "script",
            Checker::Logic(_) => "logic",
        }
    }

    /// Short human readable identity, e.g. `tcp_port:127.0.0.1:8080`
    pub fn describe(&self) -> String {
        match self {
            Checker::Process(c) => format!("process_name:{}", c.process_name()),
            Checker::PidFile(c) => format!("pid_file:{}", c.path().display()),
            Checker::Tcp(c) => format!("tcp_port:{}", c.address()),
            Checker::Command(c) => format!("command:{}", c.argv().join(" ")),
            Checker::Http(c) => format!("http:{}", c.url()),
            Checker::Script(c) => format!("script:{}", c.path().display()),
            Checker::Logic(c) => {
                let nested: Vec<String> = c.checks().iter().map(|n| n.describe()).collect();
                format!("logic:{}[{}]", c.op(), nested.join(","))
            }
        }
    }

    /// Run the check. Boxed so that logic checks can nest without bound.
    pub fn check<'a>(&'a self, ctx: &'a ExecContext) -> BoxFuture<'a, CheckResult> {
        match self {
            Checker::Process(c) => c.check(ctx).boxed(),
            Checker::PidFile(c) => c.check(ctx).boxed(),
            Checker::Tcp(c) => c.check(ctx).boxed(),
            Checker::Command(c) => c.check(ctx).boxed(),
            Checker::Http(c) => c.check(ctx).boxed(),
            Checker::Script(c) => c.check(ctx).boxed(),
            Checker::Logic(c) => c.check(ctx).boxed(),
        }
    }
}
