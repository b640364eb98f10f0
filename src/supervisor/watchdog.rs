//! Watchdog engine for target health monitoring
//!
//! Runs every enabled target's checks, tracks consecutive failures and
//! triggers policy-gated remediation when a target stays unhealthy.

use super::events::{EventDispatcher, EventKind, SupervisorEvent};
use super::policy::{self, GateDecision};
use super::state::{StateSnapshot, StateStore, TargetState};
use crate::actions::Action;
use crate::checks::Checker;
use crate::command::ExecContext;
use crate::config::{AppConfig, Policy, Target, TargetConfig};
use crate::error::{Result, VigilError};
use crate::services::Metrics;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for watchdog
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Interval between passes in daemon mode (zero is rejected by `run`)
    pub interval: Duration,
    /// Bound on one target's checks, and separately on one remediation attempt
    pub timeout: Duration,
    /// Policy applied to targets added at runtime without their own values
    pub default_policy: Policy,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(10),
            default_policy: Policy::default(),
        }
    }
}

impl WatchdogConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_seconds),
            timeout: config.timeout(),
            default_policy: config.default_policy(),
        }
    }
}

/// Watchdog engine
pub struct Watchdog {
    config: WatchdogConfig,
    targets: Arc<RwLock<Vec<Target>>>,
    states: Arc<RwLock<BTreeMap<String, TargetState>>>,
    store: Option<StateStore>,
    dispatcher: EventDispatcher,
    deliveries: Mutex<Vec<JoinHandle<()>>>,
    metrics: Option<Arc<Metrics>>,
    running: AtomicBool,
    stopping: AtomicBool,
    stop_signal: Notify,
}

impl Watchdog {
    /// Create a watchdog over `targets`; every enabled target starts healthy.
    pub fn new(config: WatchdogConfig, targets: Vec<Target>) -> Self {
        let states = targets
            .iter()
            .filter(|t| t.enabled)
            .map(|t| (t.name.clone(), TargetState::new(&t.name)))
            .collect();

        Self {
            config,
            targets: Arc::new(RwLock::new(targets)),
            states: Arc::new(RwLock::new(states)),
            store: None,
            dispatcher: EventDispatcher::new(),
            deliveries: Mutex::new(Vec::new()),
            metrics: None,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            stop_signal: Notify::new(),
        }
    }

    /// Create from loaded configuration, including the state file when set
    pub fn from_config(config: &AppConfig) -> Self {
        let watchdog = Self::new(WatchdogConfig::from_app(config), config.resolve_targets());
        match &config.state_file {
            Some(path) => watchdog.with_state_store(StateStore::new(path)),
            None => watchdog,
        }
    }

    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<Arc<Metrics>> {
        self.metrics.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Restore state from the configured store. A missing file leaves the
    /// fresh state in place; a malformed one is an error.
    pub async fn load_state(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        match store.load().await? {
            Some(snapshot) => {
                info!(path = %store.path().display(), targets = snapshot.targets.len(), "state loaded from file");
                self.restore(snapshot).await;
            }
            None => debug!(path = %store.path().display(), "no previous state file"),
        }
        Ok(())
    }

    /// Adopt saved state for enabled configured targets; others keep their fresh state.
    pub async fn restore(&self, snapshot: StateSnapshot) {
        let configured: HashSet<String> = self
            .targets
            .read()
            .await
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.name.clone())
            .collect();

        let mut states = self.states.write().await;
        for (name, mut state) in snapshot.targets {
            if configured.contains(&name) {
                state.name = name.clone();
                states.insert(name, state);
            } else {
                debug!(target = %name, "ignoring saved state for unconfigured target");
            }
        }
    }

    /// Copy of every target state
    pub async fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            targets: self.states.read().await.clone(),
        }
    }

    pub async fn target_state(&self, name: &str) -> Option<TargetState> {
        self.states.read().await.get(name).cloned()
    }

    /// True when every enabled target is currently healthy
    pub async fn all_healthy(&self) -> bool {
        let targets = self.targets.read().await;
        let states = self.states.read().await;
        targets
            .iter()
            .filter(|t| t.enabled)
            .all(|t| states.get(&t.name).map_or(true, |s| s.is_healthy))
    }

    /// Current targets in evaluation order
    pub async fn targets(&self) -> Vec<Target> {
        self.targets.read().await.clone()
    }

    /// Add a target or replace the one with the same name. Takes effect on the next pass.
    pub async fn upsert_target(&self, config: TargetConfig) -> Result<()> {
        config
            .validate()
            .map_err(|errors| VigilError::Validation(errors.join("; ")))?;
        let target = config.resolve(&self.config.default_policy);

        if target.enabled {
            self.states
                .write()
                .await
                .entry(target.name.clone())
                .or_insert_with(|| TargetState::new(&target.name));
        }

        let mut targets = self.targets.write().await;
        match targets.iter_mut().find(|t| t.name == target.name) {
            Some(existing) => {
                info!(target = %target.name, "target updated");
                *existing = target;
            }
            None => {
                info!(target = %target.name, "target added");
                targets.push(target);
            }
        }
        Ok(())
    }

    /// Remove a target and its state. Returns false when no such target exists.
    pub async fn remove_target(&self, name: &str) -> bool {
        let removed = {
            let mut targets = self.targets.write().await;
            let before = targets.len();
            targets.retain(|t| t.name != name);
            targets.len() != before
        };
        if removed {
            self.states.write().await.remove(name);
            if let Some(metrics) = &self.metrics {
                metrics.remove_target(name).await;
            }
            info!(target = %name, "target removed");
        }
        removed
    }

    /// Run one pass over all enabled targets; true when every target passed its checks.
    pub async fn run_once(&self) -> bool {
        let started = Instant::now();
        let targets: Vec<Target> = self
            .targets
            .read()
            .await
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .collect();

        let mut all_passed = true;
        for target in &targets {
            if self.stopping.load(Ordering::SeqCst) {
                info!("stop requested, ending pass early");
                break;
            }
            if !self.evaluate_target(target).await {
                all_passed = false;
            }
        }

        self.persist().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_pass(started.elapsed());
        }
        debug!(targets = targets.len(), all_passed, elapsed_ms = started.elapsed().as_millis() as u64, "pass complete");

        all_passed
    }

    /// Run passes until `stop` is called. The first pass starts immediately.
    pub async fn run(&self) -> Result<()> {
        if self.config.interval.is_zero() {
            return Err(VigilError::Validation(
                "interval_seconds must be > 0 for daemon mode".to_string(),
            ));
        }

        self.running.store(true, Ordering::SeqCst);
        let enabled = self.targets.read().await.iter().filter(|t| t.enabled).count();
        info!(
            interval_seconds = self.config.interval.as_secs(),
            targets = enabled,
            "watchdog daemon started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stopping.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.stop_signal.notified() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("watchdog daemon stopped");
        Ok(())
    }

    /// Stop the daemon loop. A pass in progress finishes its current target.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop_signal.notify_one();
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.snapshot().await;
        if let Err(e) = store.save(&snapshot).await {
            error!(path = %store.path().display(), error = %e, "failed to save state");
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        let handles = self.dispatcher.dispatch(event);
        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.retain(|h| !h.is_finished());
            deliveries.extend(handles);
        }
    }

    /// Wait for event deliveries still in flight
    pub async fn flush_events(&self) {
        let pending: Vec<JoinHandle<()>> = match self.deliveries.lock() {
            Ok(mut deliveries) => deliveries.drain(..).collect(),
            Err(_) => return,
        };
        for handle in pending {
            let _ = handle.await;
        }
    }

    /// Evaluate one target; true when all its checks passed.
    async fn evaluate_target(&self, target: &Target) -> bool {
        let started = Instant::now();
        self.states
            .write()
            .await
            .entry(target.name.clone())
            .or_insert_with(|| TargetState::new(&target.name));

        let ctx = ExecContext::with_timeout(self.config.timeout);
        let mut failures = Vec::new();
        for spec in &target.checks {
            let checker = match Checker::from_spec(spec) {
                Ok(checker) => checker,
                Err(e) => {
                    error!(target = %target.name, check = spec.kind(), error = %e, "failed to create checker");
                    failures.push(format!("{}: {}", spec.kind(), e));
                    continue;
                }
            };

            let result = checker.check(&ctx).await;
            let latency_ms = result.latency.as_millis() as u64;
            if result.success {
                debug!(target = %target.name, check = result.check_type, latency_ms, "check passed");
            } else {
                warn!(
                    target = %target.name,
                    check = result.check_type,
                    reason = %result.message,
                    latency_ms,
                    "check failed"
                );
                failures.push(format!("{}: {}", result.check_type, result.message));
            }
        }

        let healthy = failures.is_empty();
        if let Some(metrics) = &self.metrics {
            metrics.record_check(&target.name, healthy, started.elapsed()).await;
        }

        let now = Utc::now();
        let (consecutive_failures, was_healthy) = {
            let mut states = self.states.write().await;
            let state = states
                .entry(target.name.clone())
                .or_insert_with(|| TargetState::new(&target.name));
            let was_healthy = state.is_healthy;
            state.last_check_time = Some(now);
            if healthy {
                state.is_healthy = true;
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures += 1;
                state.is_healthy = false;
                state.last_message = Some(failures.join("; "));
            }
            (state.consecutive_failures, was_healthy)
        };

        if healthy {
            if !was_healthy {
                info!(target = %target.name, "target recovered");
                self.emit(SupervisorEvent::new(
                    EventKind::CheckPassed,
                    &target.name,
                    "all checks passed",
                ));
            }
            return true;
        }

        warn!(
            target = %target.name,
            consecutive_failures,
            threshold = target.policy.fail_threshold,
            "target unhealthy"
        );
        self.emit(
            SupervisorEvent::new(EventKind::CheckFailed, &target.name, failures.join("; "))
                .with_detail("consecutive_failures", consecutive_failures)
                .with_detail("threshold", target.policy.fail_threshold),
        );

        if consecutive_failures >= target.policy.fail_threshold {
            self.remediate(target).await;
        }
        false
    }

    async fn remediate(&self, target: &Target) {
        let now = Utc::now();
        let (decision, is_first_failure, consecutive_failures) = {
            let mut states = self.states.write().await;
            let state = states
                .entry(target.name.clone())
                .or_insert_with(|| TargetState::new(&target.name));
            let decision = policy::evaluate(&target.policy, state, now);
            (
                decision,
                policy::is_first_failure(&target.policy, state),
                state.consecutive_failures,
            )
        };

        match decision {
            GateDecision::Allowed => {}
            GateDecision::CoolingDown { remaining } => {
                warn!(
                    target = %target.name,
                    cooldown_remaining_seconds = remaining.num_milliseconds() as f64 / 1000.0,
                    "restart blocked by cooldown"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_blocked(&target.name).await;
                }
                return;
            }
            GateDecision::RateLimited { recent, max } => {
                error!(
                    target = %target.name,
                    restarts_in_last_hour = recent,
                    max_restarts_per_hour = max,
                    "restart blocked by rate limit"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_blocked(&target.name).await;
                }
                return;
            }
        }

        let action = match Action::from_spec(&target.action, is_first_failure) {
            Ok(action) => action,
            Err(e) => {
                error!(target = %target.name, error = %e, "failed to create action");
                if let Some(metrics) = &self.metrics {
                    metrics.record_recovery(&target.name, false).await;
                }
                self.emit(SupervisorEvent::new(
                    EventKind::RecoveryFailed,
                    &target.name,
                    e.to_string(),
                ));
                return;
            }
        };

        info!(
            target = %target.name,
            action = %action.describe(),
            consecutive_failures,
            "executing recovery action"
        );

        let ctx = ExecContext::with_timeout(self.config.timeout);
        let result = action.execute(&ctx).await;
        let latency_ms = result.latency.as_millis() as u64;

        if let Some(metrics) = &self.metrics {
            metrics.record_recovery(&target.name, result.success).await;
        }

        if result.success {
            {
                let mut states = self.states.write().await;
                if let Some(state) = states.get_mut(&target.name) {
                    policy::record_success(state, now);
                }
            }
            info!(target = %target.name, action = %action.describe(), latency_ms, "recovery action succeeded");
            self.emit(
                SupervisorEvent::new(EventKind::RecoverySuccess, &target.name, result.message)
                    .with_detail("action", action.describe())
                    .with_detail("latency_ms", latency_ms),
            );
        } else {
            error!(
                target = %target.name,
                action = %action.describe(),
                error = %result.message,
                latency_ms,
                "recovery action failed"
            );
            self.emit(
                SupervisorEvent::new(EventKind::RecoveryFailed, &target.name, result.message)
                    .with_detail("action", action.describe())
                    .with_detail("latency_ms", latency_ms),
            );
        }
    }
}
