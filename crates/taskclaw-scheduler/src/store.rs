//! File-based task store.
//! Tasks are kept in one human-readable JSON document:
//! `{"tasks": [...], "updated_at": "..."}`. A bare task array is read too.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskclaw_core::config::TaskclawConfig;
use taskclaw_core::error::{Result, TaskclawError};
use taskclaw_core::task::Task;

#[derive(Serialize, Deserialize)]
struct StoreDocument {
    tasks: Vec<Task>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `[store] tasks_path`.
    pub fn from_config(config: &TaskclawConfig) -> Self {
        Self::new(config.store.resolved_tasks_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all tasks. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<Task>> {
        if !self.path.exists() {
            tracing::debug!("📂 No task store at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let tasks = parse_document(&text).map_err(|e| {
            tracing::warn!("⚠️ Failed to parse {}: {}", self.path.display(), e);
            TaskclawError::Config(format!("task store {}: {e}", self.path.display()))
        })?;
        tracing::info!("📂 Loaded {} task(s) from {}", tasks.len(), self.path.display());
        Ok(tasks)
    }

    /// Write all tasks. The file is replaced atomically.
    pub fn save(&self, tasks: &[Task]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let document = StoreDocument {
            tasks: tasks.to_vec(),
            updated_at: Some(Utc::now()),
        };
        let json = serde_json::to_string_pretty(&document)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, &self.path)?;
        tracing::debug!("💾 Saved {} task(s) to {}", tasks.len(), self.path.display());
        Ok(())
    }
}

fn parse_document(text: &str) -> serde_json::Result<Vec<Task>> {
    let value: Value = serde_json::from_str(text)?;
    if value.is_array() {
        return serde_json::from_value(value);
    }
    serde_json::from_value::<StoreDocument>(value).map(|doc| doc.tasks)
}
