pub mod health;
pub mod history;
pub mod metrics;

pub use health::{StatusResponse, StatusServer, StatusState, TargetStatus};
pub use history::{HistoryRecorder, TargetStats};
pub use metrics::{Metrics, TargetCounters};
