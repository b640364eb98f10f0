use super::{CheckResult, Checker};
use crate::command::ExecContext;
use crate::config::CheckSpec;
use crate::error::{Result, VigilError};
use std::fmt;
use tokio::time::Instant;

const LOGIC: &str = "logic";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

impl fmt::Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicOp::And => write!(f, "AND"),
            LogicOp::Or => write!(f, "OR"),
        }
    }
}

/// Combines nested checks with AND/OR. Every nested check runs, in order,
/// whatever the earlier ones returned.
#[derive(Debug)]
pub struct LogicChecker {
    op: LogicOp,
    checks: Vec<Checker>,
}

impl LogicChecker {
    pub fn new(logic: &str, specs: &[CheckSpec]) -> Result<Self> {
        let op = match logic {
            "AND" => LogicOp::And,
            "OR" => LogicOp::Or,
            other => {
                return Err(VigilError::InvalidCheck(format!(
                    "logic must be AND or OR, got: {}",
                    other
                )))
            }
        };
        if specs.is_empty() {
            return Err(VigilError::InvalidCheck(
                "logic checker requires at least one check".to_string(),
            ));
        }

        let checks = specs
            .iter()
            .map(Checker::from_spec)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { op, checks })
    }

    pub fn op(&self) -> LogicOp {
        self.op
    }

    pub fn checks(&self) -> &[Checker] {
        &self.checks
    }

    pub async fn check(&self, ctx: &ExecContext) -> CheckResult {
        let started = Instant::now();

        let mut results = Vec::with_capacity(self.checks.len());
        for checker in &self.checks {
            results.push(checker.check(ctx).await);
        }

        match self.op {
            LogicOp::And => {
                if results.iter().all(|r| r.success) {
                    return CheckResult::pass(LOGIC, started, "all AND checks passed");
                }
                let lines: Vec<String> = results
                    .iter()
                    .map(|r| format!("{} {}", if r.success { "✓" } else { "✗" }, r.message))
                    .collect();
                CheckResult::fail(
                    LOGIC,
                    started,
                    format!("AND logic failed: {}", lines.join("; ")),
                )
            }
            LogicOp::Or => {
                if let Some(passed) = results.iter().find(|r| r.success) {
                    return CheckResult::pass(
                        LOGIC,
                        started,
                        format!("OR logic passed: {}", passed.message),
                    );
                }
                let messages: Vec<&str> = results.iter().map(|r| r.message.as_str()).collect();
                CheckResult::fail(
                    LOGIC,
                    started,
                    format!("OR logic failed (all checks failed): {}", messages.join("; ")),
                )
            }
        }
    }
}
