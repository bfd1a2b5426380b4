//! TaskClaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TaskclawError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskclawConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl TaskclawConfig {
    /// Load config from the default path (~/.taskclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TaskclawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TaskclawError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the TaskClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".taskclaw")
    }
}

/// Poll loop and bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due checks.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Pause after an unexpected loop error.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    /// Execution history entries kept by the task manager.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// How many recent results count toward `recent_failures`.
    #[serde(default = "default_recent_failure_window")]
    pub recent_failure_window: usize,
}

fn default_check_interval() -> u64 { 30 }
fn default_error_backoff() -> u64 { 60 }
fn default_history_limit() -> usize { 1000 }
fn default_recent_failure_window() -> usize { 50 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            error_backoff_secs: default_error_backoff(),
            history_limit: default_history_limit(),
            recent_failure_window: default_recent_failure_window(),
        }
    }
}

/// Action backend switches and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default = "bool_true")]
    pub enable_file_operations: bool,
    /// Off unless explicitly turned on.
    #[serde(default)]
    pub enable_command_execution: bool,
    /// Bytes of stdout/stderr kept from a command.
    #[serde(default = "default_output_limit")]
    pub command_output_limit: usize,
    /// Platform used when a send_message action names none.
    #[serde(default = "default_platform")]
    pub default_platform: String,
    #[serde(default = "default_http_timeout")]
    pub default_http_timeout_secs: u64,
    /// Where downloaded image responses are staged before sending.
    #[serde(default = "default_image_temp_dir")]
    pub image_temp_dir: PathBuf,
}

fn bool_true() -> bool { true }
fn default_output_limit() -> usize { 1024 * 1024 }
fn default_platform() -> String { "default".into() }
fn default_http_timeout() -> u64 { 30 }
fn default_image_temp_dir() -> PathBuf { std::env::temp_dir().join("taskclaw_images") }

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            enable_file_operations: true,
            enable_command_execution: false,
            command_output_limit: default_output_limit(),
            default_platform: default_platform(),
            default_http_timeout_secs: default_http_timeout(),
            image_temp_dir: default_image_temp_dir(),
        }
    }
}

/// Validation bounds and execution allowlists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Programs the command backend may launch.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    /// Absolute paths in command arguments must start with one of these.
    #[serde(default = "default_safe_path_prefixes")]
    pub safe_path_prefixes: Vec<String>,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    #[serde(default = "default_max_actions")]
    pub max_actions_per_task: usize,
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
    /// Command and file_operation actions across one batch.
    #[serde(default = "default_max_sensitive")]
    pub max_sensitive_actions: usize,
    #[serde(default = "default_max_api_calls")]
    pub max_api_calls: usize,
}

fn default_allowed_commands() -> Vec<String> {
    [
        "echo", "printf", "cat", "head", "tail", "ls", "dir", "pwd", "whoami", "date", "uptime",
        "hostname", "uname", "df", "du", "free", "ps", "which", "whereis", "file", "stat", "wc",
        "sort", "uniq", "cut", "grep", "ping", "nslookup", "dig", "iostat", "vmstat", "netstat",
        "gzip", "gunzip", "zip", "unzip", "tar",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_safe_path_prefixes() -> Vec<String> {
    ["/tmp/", "/var/tmp/", "./data/", "./logs/", "./backup/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_tasks() -> usize { 50 }
fn default_max_actions() -> usize { 10 }
fn default_min_interval() -> u64 { 10 }
fn default_max_sensitive() -> usize { 10 }
fn default_max_api_calls() -> usize { 20 }

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            safe_path_prefixes: default_safe_path_prefixes(),
            max_tasks: default_max_tasks(),
            max_actions_per_task: default_max_actions(),
            min_interval_secs: default_min_interval(),
            max_sensitive_actions: default_max_sensitive(),
            max_api_calls: default_max_api_calls(),
        }
    }
}

/// Message delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// POST target for outgoing messages. Log-only delivery when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Where failure notifications go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_notify_target_type")]
    pub target_type: String,
    #[serde(default = "default_notify_target")]
    pub target_id: String,
}

fn default_notify_target_type() -> String { "private".into() }
fn default_notify_target() -> String { "admin".into() }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            target_type: default_notify_target_type(),
            target_id: default_notify_target(),
        }
    }
}

/// Task persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_tasks_path")]
    pub tasks_path: String,
}

fn default_tasks_path() -> String { "~/.taskclaw/tasks.json".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { tasks_path: default_tasks_path() }
    }
}

impl StoreConfig {
    /// Tasks file with `~` expanded.
    pub fn resolved_tasks_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.tasks_path).into_owned())
    }
}
