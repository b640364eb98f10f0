pub mod actions;
pub mod adapters;
pub mod checks;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod services;
pub mod supervisor;

pub use config::{AppConfig, Policy, Target, TargetConfig};
pub use error::{Result, VigilError};
pub use services::{HistoryRecorder, Metrics, StatusServer, StatusState};
pub use supervisor::{
    AlertManager, EventDispatcher, EventKind, EventSink, StateSnapshot, StateStore,
    SupervisorEvent, TargetState, Watchdog, WatchdogConfig,
};
