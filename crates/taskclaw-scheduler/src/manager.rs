//! Task Manager: the owned, lock-guarded registry of tasks and the bounded
//! execution history.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskclaw_core::config::SchedulerConfig;
use taskclaw_core::error::{Result, TaskclawError};
use taskclaw_core::task::{Task, TaskResult};
use tokio::sync::RwLock;

use crate::matcher;

/// Aggregate numbers over every registered task.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskStats {
    pub total_tasks: usize,
    pub enabled_tasks: usize,
    /// Tasks whose task-level and schedule-level switches are both on.
    pub active_tasks: usize,
    pub total_executions: u64,
    /// Percent, two decimals. 100 when nothing ran yet.
    pub success_rate: f64,
    pub groups: Vec<String>,
    pub recent_failures: usize,
}

pub struct TaskManager {
    tasks: RwLock<HashMap<String, Task>>,
    history: RwLock<VecDeque<TaskResult>>,
    history_limit: usize,
    failure_window: usize,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(&SchedulerConfig::default())
    }
}

impl TaskManager {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            history_limit: config.history_limit.max(1),
            failure_window: config.recent_failure_window,
        }
    }

    /// Register a task. Fails when the id is taken.
    pub async fn add(&self, task: Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(TaskclawError::Task(format!("task id '{}' already exists", task.id)));
        }
        tracing::info!(task_id = %task.id, "📅 Task added: '{}' ({})", task.name, task.schedule.describe());
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Register several tasks. Stops at the first duplicate id; tasks before
    /// it stay registered.
    pub async fn add_all(&self, tasks: impl IntoIterator<Item = Task>) -> Result<usize> {
        let mut added = 0;
        for task in tasks {
            self.add(task).await?;
            added += 1;
        }
        Ok(added)
    }

    pub async fn remove(&self, id: &str) -> Option<Task> {
        let removed = self.tasks.write().await.remove(id);
        if let Some(task) = &removed {
            tracing::info!(task_id = %id, "🗑️ Task removed: '{}'", task.name);
        }
        removed
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.tasks.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Tasks sorted by descending priority (ties by id).
    pub async fn list(&self, group: Option<&str>, enabled_only: bool) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut listed: Vec<Task> = tasks
            .values()
            .filter(|t| group.is_none_or(|g| t.group == g))
            .filter(|t| !enabled_only || t.is_active())
            .cloned()
            .collect();
        sort_by_priority(&mut listed);
        listed
    }

    /// Every task, ordered by id, for persistence.
    pub async fn snapshot(&self) -> Vec<Task> {
        let mut all: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id).ok_or_else(|| TaskclawError::NotFound(id.to_string()))?;
        task.enabled = enabled;
        task.updated_at = Utc::now();
        tracing::info!(task_id = %id, "{} Task '{}' {}", if enabled { "▶️" } else { "⏸️" }, task.name, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Replace a task's definition. Id, run state and creation time are kept.
    pub async fn update(&self, mut task: Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let current = tasks.get_mut(&task.id).ok_or_else(|| TaskclawError::NotFound(task.id.clone()))?;
        task.state = current.state.clone();
        if task.schedule != current.schedule {
            task.state.next_run = None;
        }
        task.created_at = current.created_at;
        task.updated_at = Utc::now();
        *current = task;
        Ok(())
    }

    /// Apply one attempt's result to its task and append it to the history.
    /// Results for unknown tasks only go to the history.
    pub async fn record(&self, result: TaskResult) {
        if let Some(task) = self.tasks.write().await.get_mut(&result.task_id) {
            task.record(&result);
        }
        let mut history = self.history.write().await;
        history.push_back(result);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// The last `limit` results of one task, oldest first.
    pub async fn history(&self, task_id: &str, limit: usize) -> Vec<TaskResult> {
        let history = self.history.read().await;
        let mut recent: Vec<TaskResult> = history
            .iter()
            .rev()
            .filter(|r| r.task_id == task_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Active tasks that fire at `now`, highest priority first. Run state
    /// (next_run, interval baseline, once claim) is updated in place.
    pub async fn due_tasks(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut tasks = self.tasks.write().await;
        let successes: HashMap<String, u64> =
            tasks.iter().map(|(id, t)| (id.clone(), t.state.success_count)).collect();

        let mut due = Vec::new();
        for task in tasks.values_mut().filter(|t| t.is_active()) {
            if !matcher::dependencies_met(task, |dep| successes.get(dep).copied()) {
                continue;
            }
            if matcher::is_due(&task.schedule, now, &mut task.state) {
                due.push(task.clone());
            }
        }
        sort_by_priority(&mut due);
        due
    }

    pub async fn stats(&self) -> TaskStats {
        let tasks = self.tasks.read().await;
        let runs: u64 = tasks.values().map(|t| t.state.run_count).sum();
        let successes: u64 = tasks.values().map(|t| t.state.success_count).sum();
        let success_rate = if runs == 0 {
            100.0
        } else {
            (successes as f64 / runs as f64 * 10_000.0).round() / 100.0
        };
        let groups: BTreeSet<String> = tasks.values().map(|t| t.group.clone()).collect();

        let history = self.history.read().await;
        let recent_failures = history
            .iter()
            .rev()
            .take(self.failure_window)
            .filter(|r| !r.success)
            .count();

        TaskStats {
            total_tasks: tasks.len(),
            enabled_tasks: tasks.values().filter(|t| t.enabled).count(),
            active_tasks: tasks.values().filter(|t| t.is_active()).count(),
            total_executions: runs,
            success_rate,
            groups: groups.into_iter().collect(),
            recent_failures,
        }
    }
}

fn sort_by_priority(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
}
