use crate::supervisor::TargetState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Per-target counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetCounters {
    pub checks: u64,
    pub checks_failed: u64,
    pub recoveries: u64,
    pub recoveries_failed: u64,
    pub remediations_blocked: u64,
    /// Duration of the last evaluation, in seconds
    pub last_check_duration: f64,
}

/// Metrics collector for observability
pub struct Metrics {
    /// Completed evaluation passes
    pub passes: AtomicU64,
    /// Duration of the last pass in milliseconds
    pub last_pass_duration_ms: AtomicU64,
    started_at: DateTime<Utc>,
    targets: RwLock<BTreeMap<String, TargetCounters>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            passes: AtomicU64::new(0),
            last_pass_duration_ms: AtomicU64::new(0),
            started_at: Utc::now(),
            targets: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn record_pass(&self, duration: Duration) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.last_pass_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record one target evaluation
    pub async fn record_check(&self, target: &str, healthy: bool, duration: Duration) {
        let mut targets = self.targets.write().await;
        let counters = targets.entry(target.to_string()).or_default();
        counters.checks += 1;
        if !healthy {
            counters.checks_failed += 1;
        }
        counters.last_check_duration = duration.as_secs_f64();
    }

    pub async fn record_recovery(&self, target: &str, success: bool) {
        let mut targets = self.targets.write().await;
        let counters = targets.entry(target.to_string()).or_default();
        if success {
            counters.recoveries += 1;
        } else {
            counters.recoveries_failed += 1;
        }
    }

    pub async fn record_blocked(&self, target: &str) {
        let mut targets = self.targets.write().await;
        targets.entry(target.to_string()).or_default().remediations_blocked += 1;
    }

    /// Forget a target's counters
    pub async fn remove_target(&self, name: &str) {
        self.targets.write().await.remove(name);
    }

    pub async fn target(&self, name: &str) -> Option<TargetCounters> {
        self.targets.read().await.get(name).cloned()
    }

    /// Export metrics in Prometheus format, with live gauges taken from `states`
    pub async fn prometheus(&self, states: &[TargetState]) -> String {
        let now = Utc::now();
        let targets = self.targets.read().await;
        let mut out = String::new();

        gauge(
            &mut out,
            "vigil_uptime_seconds",
            "Time since the supervisor started",
            (now - self.started_at).num_seconds(),
        );
        counter(
            &mut out,
            "vigil_passes_total",
            "Completed evaluation passes",
            self.passes.load(Ordering::Relaxed),
        );
        gauge(
            &mut out,
            "vigil_last_pass_duration_seconds",
            "Duration of the last evaluation pass",
            self.last_pass_duration_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        );

        family(&mut out, "vigil_target_healthy", "gauge", "Target health (1=healthy, 0=unhealthy)");
        for s in states {
            sample(&mut out, "vigil_target_healthy", &s.name, u8::from(s.is_healthy));
        }
        family(&mut out, "vigil_consecutive_failures", "gauge", "Current consecutive failures");
        for s in states {
            sample(&mut out, "vigil_consecutive_failures", &s.name, s.consecutive_failures);
        }
        family(&mut out, "vigil_restarts_last_hour", "gauge", "Successful remediations in the trailing hour");
        for s in states {
            sample(&mut out, "vigil_restarts_last_hour", &s.name, s.recent_restarts(now));
        }

        let per_target: [(&str, &str, &str, fn(&TargetCounters) -> String); 6] = [
            ("vigil_checks_total", "counter", "Target evaluations", |c| c.checks.to_string()),
            ("vigil_checks_failed_total", "counter", "Failed target evaluations", |c| {
                c.checks_failed.to_string()
            }),
            ("vigil_check_duration_seconds", "gauge", "Duration of the last evaluation", |c| {
                format!("{:.3}", c.last_check_duration)
            }),
            ("vigil_recoveries_total", "counter", "Successful remediations", |c| {
                c.recoveries.to_string()
            }),
            ("vigil_recoveries_failed_total", "counter", "Failed remediations", |c| {
                c.recoveries_failed.to_string()
            }),
            (
                "vigil_remediations_blocked_total",
                "counter",
                "Remediations blocked by cooldown or rate limit",
                |c| c.remediations_blocked.to_string(),
            ),
        ];
        for (name, kind, help, value) in per_target {
            family(&mut out, name, kind, help);
            for (target, counters) in targets.iter() {
                sample(&mut out, name, target, value(counters));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn family(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    family(out, name, "gauge", help);
    let _ = writeln!(out, "{} {}", name, value);
}

fn counter(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    family(out, name, "counter", help);
    let _ = writeln!(out, "{} {}", name, value);
}

fn sample(out: &mut String, name: &str, target: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{}{{target=\"{}\"}} {}", name, escape_label(target), value);
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
