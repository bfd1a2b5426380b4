//! Failure notifications for the `notify` policy.

use std::sync::Arc;

use async_trait::async_trait;
use taskclaw_core::config::NotifyConfig;
use taskclaw_core::message::{MessageContent, OutgoingMessage, TargetType};
use taskclaw_core::task::{Task, TaskResult};
use taskclaw_core::traits::{Messenger, Notifier};

/// Admin-facing text for a task that ran out of retries.
pub fn failure_text(task: &Task, last_result: Option<&TaskResult>) -> String {
    let last_error = last_result
        .map(|r| r.error.as_deref().map_or_else(|| r.message.clone(), |code| format!("{} ({code})", r.message)))
        .unwrap_or_else(|| "see logs".into());
    format!(
        "⚠️ Task failed\nTask: {}\nFailures: {}\nLast error: {}",
        task.name, task.state.fail_count, last_error
    )
}

/// Sends the failure text to the configured admin target.
pub struct MessengerNotifier {
    messenger: Arc<dyn Messenger>,
    platform: String,
    target_type: TargetType,
    target_id: String,
}

impl MessengerNotifier {
    pub fn new(messenger: Arc<dyn Messenger>, config: &NotifyConfig) -> Self {
        let target_type = TargetType::parse(&config.target_type).unwrap_or_else(|| {
            tracing::warn!("⚠️ Unknown notify target_type '{}', using private", config.target_type);
            TargetType::Private
        });
        Self {
            messenger,
            platform: config.platform.clone(),
            target_type,
            target_id: config.target_id.clone(),
        }
    }
}

#[async_trait]
impl Notifier for MessengerNotifier {
    async fn task_failed(&self, task: &Task, last_result: Option<&TaskResult>) {
        let message = OutgoingMessage {
            platform: self.platform.clone(),
            target_type: self.target_type,
            target_id: self.target_id.clone(),
            content: MessageContent::Text(failure_text(task, last_result)),
        };
        let report = self.messenger.send(&message).await;
        if report.success {
            tracing::info!(task_id = %task.id, "📣 Failure notice sent to {}:{}", self.target_type, self.target_id);
        } else {
            tracing::error!(task_id = %task.id, "❌ Failure notice not delivered: {}", report.message);
        }
    }
}

/// Only logs. Used when no admin target is wanted.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn task_failed(&self, task: &Task, last_result: Option<&TaskResult>) {
        tracing::error!(task_id = %task.id, "{}", failure_text(task, last_result));
    }
}
