//! # TaskClaw Core
//!
//! Shared foundation for the TaskClaw scheduler: the error type, configuration,
//! task data model, cron grammar and the collaborator traits the other crates
//! plug into.

pub mod config;
pub mod cron;
pub mod error;
pub mod message;
pub mod outcome;
pub mod task;
pub mod timezone;
pub mod traits;

pub use config::TaskclawConfig;
pub use error::{Result, TaskclawError};
pub use message::{DeliveryReport, MessageContent, MessageSegment, OutgoingMessage, TargetType};
pub use outcome::{ActionOutcome, ExecutionReport};
pub use task::{
    Action, ActionKind, ApiCallConfig, CommandConfig, Condition, FailurePolicy, FileOperation,
    FileOperationConfig, HttpMethod, IntervalSpec, ResponseForwarding, RunState, Schedule,
    ScheduleRule, SendMessageConfig, Task, TaskResult,
};
pub use traits::{Messenger, Notifier, TaskExecutor};
