//! # TaskClaw Actions
//!
//! Everything that happens once a task fires: `{{variable}}` templating,
//! per-action conditions, the four action backends and the pipeline that
//! strings them together.

pub mod backends;
pub mod condition;
pub mod extract;
pub mod messenger;
pub mod pipeline;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use backends::{ActionBackend, BackendRegistry};
pub use condition::ConditionEvaluator;
pub use messenger::{LogMessenger, WebhookMessenger};
pub use pipeline::ActionPipeline;
pub use template::{RunContext, VariableReplacer};
