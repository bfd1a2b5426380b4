//! # TaskClaw Scheduler
//!
//! Decides when tasks are due and runs them through a [`TaskExecutor`] with
//! retry, backoff and failure policies.
//!
//! ## Architecture
//! ```text
//! Scheduler (poll every check_interval_secs)
//!   ├── TaskManager::due_tasks(now)
//!   │     ├── dependency gate (every dependency succeeded once)
//!   │     └── matcher::is_due: cron │ interval │ once │ manual
//!   ├── sort by priority, skip tasks still in flight
//!   └── one unit per task → executor → TaskResult per attempt
//!                             └── retries exhausted → log │ notify │ disable
//! ```
//!
//! [`TaskExecutor`]: taskclaw_core::TaskExecutor

pub mod engine;
pub mod manager;
pub mod matcher;
pub mod notify;
pub mod store;

pub use engine::{RejectReason, RunNowResponse, RunPhase, Scheduler, SchedulerStats};
pub use manager::{TaskManager, TaskStats};
pub use notify::{LogNotifier, MessengerNotifier};
pub use store::TaskStore;
