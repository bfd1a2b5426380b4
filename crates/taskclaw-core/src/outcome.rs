//! Outcome records produced by action backends and by whole task runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Machine-readable error codes carried in `ActionOutcome::error`.
pub mod codes {
    pub const TIMEOUT: &str = "timeout";
    pub const SECURITY_REJECTED: &str = "security_rejected";
    pub const DISABLED: &str = "disabled";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_CONFIG: &str = "invalid_config";
    pub const BACKEND_ERROR: &str = "backend_error";
    pub const PANIC: &str = "panic";
    pub const HTTP_STATUS: &str = "http_status";
    pub const EXIT_STATUS: &str = "exit_status";
}

/// Result of one backend call: `{success, message, data?, error?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Variables published into the run context for later actions.
    #[serde(skip)]
    pub exports: Map<String, Value>,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Failure carrying a machine error code.
    pub fn failed_with(message: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(code.to_string()),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn export(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.exports.insert(key.to_string(), value.into());
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(codes::TIMEOUT)
    }
}

/// Aggregate result of running one task's action list once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Actions that ran (conditions held).
    pub executed: usize,
    /// Actions skipped by their conditions.
    pub skipped: usize,
}

impl ExecutionReport {
    pub fn success(message: impl Into<String>, executed: usize, skipped: usize) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            executed,
            skipped,
        }
    }

    /// Build the run outcome from the action that stopped the pipeline.
    pub fn from_failed_action(outcome: &ActionOutcome, executed: usize, skipped: usize) -> Self {
        Self {
            success: false,
            message: outcome.message.clone(),
            error: outcome.error.clone(),
            executed,
            skipped,
        }
    }
}
