//! Collaborator seams: message delivery, failure notification, task execution.

use async_trait::async_trait;

use crate::message::{DeliveryReport, OutgoingMessage};
use crate::outcome::ExecutionReport;
use crate::task::{Task, TaskResult};

/// Delivers messages to a chat platform. How delivery happens is up to the
/// implementation; failures are reported, never raised.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn send(&self, message: &OutgoingMessage) -> DeliveryReport;
}

/// Invoked by the `notify` failure policy once a task exhausted its retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn task_failed(&self, task: &Task, last_result: Option<&TaskResult>);
}

/// Runs one attempt of a task's action list.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> ExecutionReport;
}
