//! Scheduler Engine: the poll loop and per-task execution units.
//!
//! One loop wakes every `check_interval_secs`, asks the [`TaskManager`] for
//! due tasks and spawns one unit per task. A unit runs the task through the
//! executor, retries with linear backoff and applies the failure policy when
//! retries run out. At most one unit per task id is in flight.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use taskclaw_core::config::SchedulerConfig;
use taskclaw_core::outcome::{ExecutionReport, codes};
use taskclaw_core::task::{FailurePolicy, Task, TaskResult};
use taskclaw_core::traits::{Notifier, TaskExecutor};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::manager::TaskManager;

/// Where a task's latest execution unit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Never dispatched since the scheduler was created.
    Idle,
    Running,
    /// Waiting out the backoff before the next attempt.
    RetryPending,
    Succeeded,
    /// Retries exhausted.
    Failed,
    /// Stopped with the scheduler.
    Cancelled,
    /// Task switched off.
    Disabled,
}

impl RunPhase {
    fn in_flight(self) -> bool {
        matches!(self, Self::Running | Self::RetryPending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadyRunning,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunNowResponse {
    Accepted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SchedulerStats {
    pub running: bool,
    pub total_tasks: usize,
    pub running_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

struct Unit {
    phase: RunPhase,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    manager: Arc<TaskManager>,
    executor: Arc<dyn TaskExecutor>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    cancel: Mutex<CancellationToken>,
    units: Mutex<HashMap<String, Unit>>,
    poll: Mutex<Option<JoinHandle<()>>>,
}

/// The scheduler. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    pub fn new(
        manager: Arc<TaskManager>,
        executor: Arc<dyn TaskExecutor>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                manager,
                executor,
                notifier,
                config,
                cancel: Mutex::new(CancellationToken::new()),
                units: Mutex::new(HashMap::new()),
                poll: Mutex::new(None),
            }),
        }
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.inner.manager
    }

    /// Start the poll loop. Returns false when it is already running.
    pub fn start(&self) -> bool {
        let mut poll = locked(&self.inner.poll);
        if poll.is_some() {
            tracing::warn!("⚠️ Scheduler already running");
            return false;
        }
        let token = {
            let mut cancel = locked(&self.inner.cancel);
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
            cancel.clone()
        };
        tracing::info!("⏰ Scheduler started (check every {}s)", self.inner.config.check_interval_secs);
        *poll = Some(tokio::spawn(poll_loop(self.inner.clone(), token)));
        true
    }

    /// Cancel the poll loop and every in-flight unit, then wait for them.
    pub async fn stop(&self) {
        locked(&self.inner.cancel).cancel();
        let poll = locked(&self.inner.poll).take();
        let handles: Vec<(String, JoinHandle<()>)> = locked(&self.inner.units)
            .iter_mut()
            .filter_map(|(id, unit)| unit.handle.take().map(|h| (id.clone(), h)))
            .collect();

        if let Some(poll) = poll {
            let _ = poll.await;
        }
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::warn!(task_id = %id, "⚠️ Execution unit ended abnormally: {}", e);
            }
        }
        tracing::info!("🛑 Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        locked(&self.inner.poll).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Run a task now, bypassing its schedule. Respects the one-unit-per-task
    /// guard and the retry contract.
    pub async fn run_now(&self, task_id: &str) -> RunNowResponse {
        let Some(task) = self.inner.manager.get(task_id).await else {
            return RunNowResponse::Rejected(RejectReason::NotFound);
        };
        let token = locked(&self.inner.cancel).clone();
        if self.inner.clone().dispatch(task, token) {
            RunNowResponse::Accepted
        } else {
            tracing::warn!(task_id = %task_id, "⏳ Task is already running");
            RunNowResponse::Rejected(RejectReason::AlreadyRunning)
        }
    }

    /// `None` when the task does not exist.
    pub async fn status(&self, task_id: &str) -> Option<RunPhase> {
        let task = self.inner.manager.get(task_id).await?;
        let phase = locked(&self.inner.units).get(task_id).map(|u| u.phase);
        Some(match phase {
            Some(phase) if phase.in_flight() => phase,
            _ if !task.enabled => RunPhase::Disabled,
            Some(phase) => phase,
            None => RunPhase::Idle,
        })
    }

    /// Whether a unit for this task is in flight.
    pub fn is_task_running(&self, task_id: &str) -> bool {
        locked(&self.inner.units).get(task_id).is_some_and(|u| u.phase.in_flight())
    }

    pub async fn stats(&self) -> SchedulerStats {
        let total_tasks = self.inner.manager.len().await;
        let units = locked(&self.inner.units);
        let count = |wanted: fn(RunPhase) -> bool| units.values().filter(|u| wanted(u.phase)).count();
        SchedulerStats {
            running: self.is_running(),
            total_tasks,
            running_tasks: count(RunPhase::in_flight),
            completed_tasks: count(|p| p == RunPhase::Succeeded),
            failed_tasks: count(|p| p == RunPhase::Failed),
        }
    }

    /// One due check and dispatch round. The poll loop calls this.
    pub async fn tick(&self) -> usize {
        let token = locked(&self.inner.cancel).clone();
        self.inner.clone().check_and_dispatch(&token).await
    }
}

async fn poll_loop(inner: Arc<Inner>, token: CancellationToken) {
    let every = Duration::from_secs(inner.config.check_interval_secs.max(1));
    let backoff = Duration::from_secs(inner.config.error_backoff_secs);

    loop {
        let checked = AssertUnwindSafe(inner.clone().check_and_dispatch(&token))
            .catch_unwind()
            .await;
        let pause = match checked {
            Ok(_) => every,
            Err(panic) => {
                tracing::error!("💥 Scheduler check crashed: {}; backing off {}s", panic_reason(&panic), backoff.as_secs());
                backoff
            }
        };
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

impl Inner {
    async fn check_and_dispatch(self: Arc<Self>, token: &CancellationToken) -> usize {
        if token.is_cancelled() {
            return 0;
        }
        let due = self.manager.due_tasks(Utc::now()).await;
        let mut started = 0;
        for task in due {
            let (id, name) = (task.id.clone(), task.name.clone());
            if self.clone().dispatch(task, token.clone()) {
                tracing::info!(task_id = %id, "🔔 Task due: '{}'", name);
                started += 1;
            } else {
                tracing::debug!(task_id = %id, "⏭️ '{}' still running, skipped", name);
            }
        }
        started
    }

    /// Spawn a unit unless one is in flight for this task.
    fn dispatch(self: Arc<Self>, task: Task, token: CancellationToken) -> bool {
        let mut units = locked(&self.units);
        if units.get(&task.id).is_some_and(|u| u.phase.in_flight()) {
            return false;
        }
        let id = task.id.clone();
        let handle = tokio::spawn(self.clone().run_unit(task, token));
        units.insert(id, Unit { phase: RunPhase::Running, handle: Some(handle) });
        true
    }

    fn set_phase(&self, task_id: &str, phase: RunPhase) {
        if let Some(unit) = locked(&self.units).get_mut(task_id) {
            unit.phase = phase;
        }
    }

    async fn run_unit(self: Arc<Self>, task: Task, token: CancellationToken) {
        let phase = self.attempt_all(&task, &token).await;
        self.set_phase(&task.id, phase);
    }

    /// Attempts `1..=retry_count + 1`, each recorded as one TaskResult.
    async fn attempt_all(&self, task: &Task, token: &CancellationToken) -> RunPhase {
        let attempts = task.retry_count.saturating_add(1);
        let mut last = None;

        for attempt in 1..=attempts {
            self.set_phase(&task.id, RunPhase::Running);
            let timestamp = Utc::now();
            let started = tokio::time::Instant::now();

            let report = tokio::select! {
                report = AssertUnwindSafe(self.executor.execute(task)).catch_unwind() => report,
                _ = token.cancelled() => {
                    tracing::info!(task_id = %task.id, "🛑 Cancelled '{}' during attempt {}", task.name, attempt);
                    return RunPhase::Cancelled;
                }
            };
            let report = report.unwrap_or_else(|panic| {
                tracing::error!(task_id = %task.id, "💥 Executor panicked: {}", panic_reason(&panic));
                ExecutionReport {
                    success: false,
                    message: format!("executor crashed: {}", panic_reason(&panic)),
                    error: Some(codes::PANIC.into()),
                    executed: 0,
                    skipped: 0,
                }
            });

            let result = TaskResult {
                task_id: task.id.clone(),
                success: report.success,
                message: report.message,
                timestamp,
                duration: started.elapsed().as_secs_f64(),
                error: report.error,
                attempt,
            };
            self.manager.record(result.clone()).await;

            if result.success {
                tracing::info!(task_id = %task.id, "✅ '{}' succeeded ({:.2}s)", task.name, result.duration);
                return RunPhase::Succeeded;
            }
            tracing::warn!(
                task_id = %task.id,
                "⚠️ '{}' failed (attempt {}/{}): {}",
                task.name,
                attempt,
                attempts,
                result.message
            );
            last = Some(result);

            if attempt < attempts {
                let delay = task.retry_delay.saturating_mul(u64::from(attempt));
                tracing::info!(task_id = %task.id, "🔁 Retrying '{}' in {}s ({}/{})", task.name, delay, attempt, task.retry_count);
                self.set_phase(&task.id, RunPhase::RetryPending);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                    _ = token.cancelled() => return RunPhase::Cancelled,
                }
            }
        }

        tracing::error!(task_id = %task.id, "❌ '{}' failed after {} attempt(s)", task.name, attempts);
        self.apply_failure_policy(task, last.as_ref()).await;
        RunPhase::Failed
    }

    async fn apply_failure_policy(&self, task: &Task, last: Option<&TaskResult>) {
        match task.on_failure {
            FailurePolicy::Log => {}
            FailurePolicy::Disable => {
                if let Err(e) = self.manager.set_enabled(&task.id, false).await {
                    tracing::warn!(task_id = %task.id, "⚠️ Could not disable task: {}", e);
                }
            }
            FailurePolicy::Notify => {
                let current = self.manager.get(&task.id).await.unwrap_or_else(|| task.clone());
                let notified = AssertUnwindSafe(self.notifier.task_failed(&current, last)).catch_unwind().await;
                if let Err(panic) = notified {
                    tracing::error!(task_id = %task.id, "💥 Failure notifier panicked: {}", panic_reason(&panic));
                }
            }
        }
    }
}

fn panic_reason(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
