//! Supervisor layer for target monitoring and recovery
//!
//! - Watchdog engine that runs checks and policy-gated remediation
//! - Persisted per-target state
//! - Event fan-out to notifications and history

pub mod alert_manager;
pub mod events;
pub mod policy;
pub mod state;
pub mod watchdog;

pub use alert_manager::{AlertLevel, AlertManager};
pub use events::{EventDispatcher, EventKind, EventSink, SupervisorEvent};
pub use policy::GateDecision;
pub use state::{StateSnapshot, StateStore, TargetState};
pub use watchdog::{Watchdog, WatchdogConfig};
