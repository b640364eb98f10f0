//! Remediation gating: cooldown then hourly rate limit

use super::state::TargetState;
use crate::config::Policy;
use chrono::{DateTime, Duration, Utc};

/// Whether a remediation may run now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    CoolingDown { remaining: Duration },
    RateLimited { recent: usize, max: u32 },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Decide whether a remediation may run for a target that has crossed its
/// failure threshold. Prunes the restart window to the trailing hour when
/// the cooldown does not apply.
pub fn evaluate(policy: &Policy, state: &mut TargetState, now: DateTime<Utc>) -> GateDecision {
    if let Some(last) = state.last_restart_time {
        let elapsed = now.signed_duration_since(last);
        let cooldown = policy.restart_cooldown();
        if elapsed < cooldown {
            return GateDecision::CoolingDown {
                remaining: cooldown - elapsed,
            };
        }
    }

    let window_start = now - Duration::hours(1);
    state.restarts_in_last_hour.retain(|t| *t > window_start);

    let recent = state.restarts_in_last_hour.len();
    if recent >= policy.max_restarts_per_hour as usize {
        return GateDecision::RateLimited {
            recent,
            max: policy.max_restarts_per_hour,
        };
    }

    GateDecision::Allowed
}

/// True when this attempt is the first of the failure episode
pub fn is_first_failure(policy: &Policy, state: &TargetState) -> bool {
    state.consecutive_failures == policy.fail_threshold
}

/// Book a successful remediation at `now`
pub fn record_success(state: &mut TargetState, now: DateTime<Utc>) {
    state.last_restart_time = Some(now);
    state.restarts_in_last_hour.push(now);
    state.consecutive_failures = 0;
    state.is_healthy = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(cooldown: u64, max: u32) -> Policy {
        Policy {
            fail_threshold: 2,
            restart_cooldown_seconds: cooldown,
            max_restarts_per_hour: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_never_restarted_is_allowed() {
        let mut state = TargetState::new("t");
        assert_eq!(evaluate(&policy(60, 10), &mut state, Utc::now()), GateDecision::Allowed);
    }

    #[test]
    fn test_cooldown_blocks() {
        let now = Utc::now();
        let mut state = TargetState::new("t");
        state.last_restart_time = Some(now - Duration::seconds(30));

        match evaluate(&policy(60, 10), &mut state, now) {
            GateDecision::CoolingDown { remaining } => assert_eq!(remaining, Duration::seconds(30)),
            other => panic!("expected cooldown, got {:?}", other),
        }

        assert!(evaluate(&policy(60, 10), &mut state, now + Duration::seconds(30)).is_allowed());
    }

    #[test]
    fn test_rate_limit_prunes_then_blocks() {
        let now = Utc::now();
        let mut state = TargetState::new("t");
        state.last_restart_time = Some(now - Duration::minutes(10));
        state.restarts_in_last_hour = vec![
            now - Duration::minutes(120),
            now - Duration::minutes(61),
            now - Duration::minutes(30),
            now - Duration::minutes(10),
        ];

        assert_eq!(
            evaluate(&policy(60, 2), &mut state, now),
            GateDecision::RateLimited { recent: 2, max: 2 }
        );
        assert_eq!(state.restarts_in_last_hour.len(), 2);

        assert!(evaluate(&policy(60, 3), &mut state, now).is_allowed());
    }

    #[test]
    fn test_cooldown_is_checked_before_pruning() {
        let now = Utc::now();
        let mut state = TargetState::new("t");
        state.last_restart_time = Some(now - Duration::seconds(5));
        state.restarts_in_last_hour = vec![now - Duration::hours(3), now - Duration::seconds(5)];

        assert!(!evaluate(&policy(60, 10), &mut state, now).is_allowed());
        assert_eq!(state.restarts_in_last_hour.len(), 2);
    }

    #[test]
    fn test_record_success_and_first_failure() {
        let now = Utc::now();
        let p = policy(60, 10);
        let mut state = TargetState::new("t");
        state.consecutive_failures = 2;
        state.is_healthy = false;
        assert!(is_first_failure(&p, &state));

        record_success(&mut state, now);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.is_healthy);
        assert_eq!(state.last_restart_time, Some(now));
        assert_eq!(state.restarts_in_last_hour, vec![now]);
        assert!(!is_first_failure(&p, &state));
    }
}
