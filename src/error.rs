use std::time::Duration;
use thiserror::Error;

/// Main error type for the supervisor
#[derive(Error, Debug)]
pub enum VigilError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Construction errors (invalid check/action configuration at runtime)
    #[error("Invalid check: {0}")]
    InvalidCheck(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    // Persistence errors
    #[error("State snapshot error: {0}")]
    State(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Notification failed: {0}")]
    Notification(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for VigilError
pub type Result<T> = std::result::Result<T, VigilError>;

/// Failures to run an external command at all. A command that runs and exits
/// non-zero is not an error; it is reported through its exit code.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}ms", elapsed.as_millis())]
    TimedOut { program: String, elapsed: Duration },
}
