//! Action Pipeline: runs one task's actions in order.
//!
//! Per action: evaluate conditions, substitute `{{vars}}` into the config,
//! dispatch to the backend for its type. The first failing action ends the
//! run. A skipped action leaves `previous_action_success` untouched.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::{Value, json};
use taskclaw_core::config::TaskclawConfig;
use taskclaw_core::error::Result;
use taskclaw_core::outcome::{ActionOutcome, ExecutionReport, codes};
use taskclaw_core::task::{Action, ActionKind, Task};
use taskclaw_core::traits::{Messenger, TaskExecutor};

use crate::backends::BackendRegistry;
use crate::condition::ConditionEvaluator;
use crate::template::{RunContext, VariableReplacer};

pub struct ActionPipeline {
    backends: BackendRegistry,
    replacer: Arc<VariableReplacer>,
    conditions: ConditionEvaluator,
}

impl ActionPipeline {
    pub fn new(backends: BackendRegistry, replacer: VariableReplacer) -> Self {
        let replacer = Arc::new(replacer);
        Self {
            conditions: ConditionEvaluator::new(replacer.clone()),
            backends,
            replacer,
        }
    }

    /// Standard backends with the given messenger.
    pub fn from_config(config: &TaskclawConfig, messenger: Arc<dyn Messenger>) -> Result<Self> {
        Ok(Self::new(BackendRegistry::standard(config, messenger)?, VariableReplacer::new()))
    }

    /// Swap the condition evaluator, e.g. for one with a fixed clock.
    pub fn with_conditions(mut self, conditions: ConditionEvaluator) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn replacer(&self) -> &VariableReplacer {
        &self.replacer
    }

    /// Run every action of `task` once.
    pub async fn run(&self, task: &Task) -> ExecutionReport {
        let mut ctx = base_context(task);
        let (mut executed, mut skipped) = (0, 0);

        for (index, action) in task.actions.iter().enumerate() {
            let kind = action.kind.type_name();
            if !self.conditions.evaluate_all(&action.conditions, &ctx) {
                tracing::debug!(task_id = %task.id, "⏭️ Action {} ({}) skipped by its conditions", index + 1, kind);
                skipped += 1;
                continue;
            }

            let outcome = self.run_action(action, &ctx).await;
            executed += 1;

            if let Some(Value::Array(results)) = ctx.get_mut("results") {
                results.push(json!({
                    "action": kind,
                    "success": outcome.success,
                    "message": outcome.message,
                }));
            }
            ctx.extend(outcome.exports.clone());
            ctx.insert("previous_action_success".into(), Value::Bool(outcome.success));

            if !outcome.success {
                tracing::warn!(
                    task_id = %task.id,
                    "❌ Action {} ({}) failed: {}",
                    index + 1,
                    kind,
                    outcome.message
                );
                return ExecutionReport::from_failed_action(&outcome, executed, skipped);
            }
            tracing::debug!(task_id = %task.id, "✅ Action {} ({}): {}", index + 1, kind, outcome.message);
        }

        ExecutionReport::success(format!("task {} completed", task.name), executed, skipped)
    }

    /// Substitute, re-decode and execute one action. Never panics past here.
    async fn run_action(&self, action: &Action, ctx: &RunContext) -> ActionOutcome {
        let type_name = action.kind.type_name();
        let config = self.replacer.substitute_value(&action.kind.config_value(), ctx);
        let kind = match ActionKind::decode(type_name, config) {
            Ok(kind) => kind,
            Err(e) => return ActionOutcome::failed_with(e.to_string(), codes::INVALID_CONFIG),
        };

        let Some(backend) = self.backends.get(type_name) else {
            return ActionOutcome::failed_with(format!("no backend registered for {type_name}"), codes::INVALID_CONFIG);
        };

        match AssertUnwindSafe(backend.execute(&kind)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                tracing::error!("💥 {} backend panicked: {}", type_name, reason);
                ActionOutcome::failed_with(format!("{type_name} backend crashed: {reason}"), codes::PANIC)
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for ActionPipeline {
    async fn execute(&self, task: &Task) -> ExecutionReport {
        self.run(task).await
    }
}

fn base_context(task: &Task) -> RunContext {
    let mut ctx = RunContext::new();
    ctx.insert("task_id".into(), Value::String(task.id.clone()));
    ctx.insert("task_name".into(), Value::String(task.name.clone()));
    ctx.insert("execution_time".into(), Value::String(Utc::now().to_rfc3339()));
    ctx.insert("previous_action_success".into(), Value::Bool(true));
    ctx.insert("results".into(), Value::Array(Vec::new()));
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{ActionBackend, FileBackend, MessageBackend};
    use crate::testing::RecordingMessenger;
    use taskclaw_core::message::MessageContent;
    use taskclaw_core::task::{Condition, Schedule};

    /// Reports success or failure depending on the command text, and
    /// exports `stdout`.
    struct ScriptedCommands;

    #[async_trait]
    impl ActionBackend for ScriptedCommands {
        fn kind(&self) -> &'static str {
            ActionKind::COMMAND
        }

        async fn execute(&self, action: &ActionKind) -> ActionOutcome {
            let ActionKind::Command(config) = action else {
                return ActionOutcome::fail("wrong kind");
            };
            match config.command.as_str() {
                "boom" => panic!("scripted panic"),
                "fail" => ActionOutcome::failed_with("scripted failure", codes::EXIT_STATUS),
                other => ActionOutcome::ok("ran").export("stdout", other),
            }
        }
    }

    fn pipeline(messenger: Arc<RecordingMessenger>) -> ActionPipeline {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(ScriptedCommands));
        registry.register(Arc::new(MessageBackend::new(messenger, "chat")));
        ActionPipeline::new(registry, VariableReplacer::new())
    }

    fn command(text: &str) -> Action {
        Action::new(ActionKind::decode(ActionKind::COMMAND, json!({"command": text})).unwrap())
    }

    fn message(text: &str) -> Action {
        Action::new(
            ActionKind::decode(ActionKind::SEND_MESSAGE, json!({"target_id": "1", "message": text})).unwrap(),
        )
    }

    fn task(actions: Vec<Action>) -> Task {
        Task::new("nightly", Schedule::manual(), actions).with_id("t1")
    }

    #[tokio::test]
    async fn test_exports_flow_into_later_actions() {
        let messenger = Arc::new(RecordingMessenger::default());
        let report = pipeline(messenger.clone())
            .run(&task(vec![command("42 files"), message("{{task_name}}: {{stdout}} ({{results.0.action}})")]))
            .await;

        assert!(report.success, "{}", report.message);
        assert_eq!(report.message, "task nightly completed");
        assert_eq!(report.executed, 2);
        assert_eq!(messenger.sent()[0].content, MessageContent::Text("nightly: 42 files (command)".into()));
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_run() {
        let messenger = Arc::new(RecordingMessenger::default());
        let report = pipeline(messenger.clone())
            .run(&task(vec![command("fail"), message("never")]))
            .await;

        assert!(!report.success);
        assert_eq!(report.message, "scripted failure");
        assert_eq!(report.error.as_deref(), Some(codes::EXIT_STATUS));
        assert_eq!(report.executed, 1);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_action_keeps_previous_flag() {
        let messenger = Arc::new(RecordingMessenger::default());
        let actions = vec![
            command("ok"),
            message("only on failure").when(Condition::PreviousActionFailed),
            message("after success").when(Condition::PreviousActionSuccess),
        ];
        let report = pipeline(messenger.clone()).run(&task(actions)).await;

        assert!(report.success);
        assert_eq!((report.executed, report.skipped), (2, 1));
        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, MessageContent::Text("after success".into()));
    }

    #[tokio::test]
    async fn test_backend_panic_becomes_failure() {
        let report = pipeline(Arc::new(RecordingMessenger::default()))
            .run(&task(vec![command("boom")]))
            .await;
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some(codes::PANIC));
        assert!(report.message.contains("scripted panic"));
    }

    #[tokio::test]
    async fn test_missing_backend_fails() {
        let registry = BackendRegistry::new();
        let report = ActionPipeline::new(registry, VariableReplacer::new())
            .run(&task(vec![command("ok")]))
            .await;
        assert_eq!(report.error.as_deref(), Some(codes::INVALID_CONFIG));
    }

    #[tokio::test]
    async fn test_custom_variables_reach_backends() {
        let messenger = Arc::new(RecordingMessenger::default());
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(MessageBackend::new(messenger.clone(), "chat")));
        let mut replacer = VariableReplacer::new();
        replacer.set_custom("env", "prod");
        let report = ActionPipeline::new(registry, replacer)
            .run(&task(vec![message("[{{env}}] {{task_id}} {{unknown}}")]))
            .await;
        assert!(report.success);
        assert_eq!(messenger.sent()[0].content, MessageContent::Text("[prod] t1 {{unknown}}".into()));
    }

    #[tokio::test]
    async fn test_substituted_paths_are_checked() {
        let dir = tempfile::tempdir_in("/tmp").unwrap();
        let target = dir.path().join("hostname");
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(FileBackend::new(true)));
        let mut replacer = VariableReplacer::new();
        replacer.set_custom("src", "/etc/hostname");
        let copy = Action::new(
            ActionKind::decode(
                ActionKind::FILE_OPERATION,
                json!({"operation": "copy", "source_path": "{{src}}", "target_path": target.to_string_lossy()}),
            )
            .unwrap(),
        );

        let report = ActionPipeline::new(registry, replacer).run(&task(vec![copy])).await;
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some(codes::SECURITY_REJECTED));
        assert!(!target.exists());
    }
}
