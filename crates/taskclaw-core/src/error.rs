//! Error types shared by every TaskClaw crate.

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, TaskclawError>;

#[derive(Debug, Error)]
pub enum TaskclawError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Security violation: {0}")]
    Security(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    Cron { expression: String, reason: String },

    #[error("Task error: {0}")]
    Task(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TaskclawError {
    pub fn cron(expression: &str, reason: impl Into<String>) -> Self {
        Self::Cron {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for TaskclawError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse TOML: {e}"))
    }
}

impl From<toml::ser::Error> for TaskclawError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(format!("Failed to serialize TOML: {e}"))
    }
}
