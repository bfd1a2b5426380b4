//! Action backends: one per action kind, looked up by type tag.

pub mod command;
pub mod file;
pub mod http;
pub mod message;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use taskclaw_core::config::TaskclawConfig;
use taskclaw_core::error::Result;
use taskclaw_core::outcome::{ActionOutcome, codes};
use taskclaw_core::task::ActionKind;
use taskclaw_core::traits::Messenger;

pub use command::CommandBackend;
pub use file::FileBackend;
pub use http::HttpBackend;
pub use message::MessageBackend;

/// Executes one decoded action. Failures are reported in the outcome,
/// never returned as errors.
#[async_trait]
pub trait ActionBackend: Send + Sync {
    /// The action type tag this backend handles.
    fn kind(&self) -> &'static str;

    async fn execute(&self, action: &ActionKind) -> ActionOutcome;
}

/// Outcome for an action routed to the wrong backend.
pub(crate) fn mismatched(backend: &str, action: &ActionKind) -> ActionOutcome {
    ActionOutcome::failed_with(
        format!("{backend} backend cannot run a {} action", action.type_name()),
        codes::INVALID_CONFIG,
    )
}

/// Backends keyed by action type.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<&'static str, Arc<dyn ActionBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four standard backends wired from configuration.
    pub fn standard(config: &TaskclawConfig, messenger: Arc<dyn Messenger>) -> Result<Self> {
        let messages = MessageBackend::new(messenger, &config.actions.default_platform);
        let mut registry = Self::new();
        registry.register(Arc::new(HttpBackend::new(&config.actions, messages.clone())?));
        registry.register(Arc::new(messages));
        registry.register(Arc::new(FileBackend::new(config.actions.enable_file_operations)));
        registry.register(Arc::new(CommandBackend::new(&config.actions, &config.security)));
        Ok(registry)
    }

    /// Add or replace the backend for its kind.
    pub fn register(&mut self, backend: Arc<dyn ActionBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ActionBackend>> {
        self.backends.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.backends.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::LogMessenger;

    #[test]
    fn test_standard_registry_covers_every_kind() {
        let registry = BackendRegistry::standard(&TaskclawConfig::default(), Arc::new(LogMessenger)).unwrap();
        assert_eq!(registry.kinds(), vec!["api_call", "command", "file_operation", "send_message"]);
        assert!(registry.get("teleport").is_none());
    }
}
