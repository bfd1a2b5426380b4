//! `send_message` backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use taskclaw_core::message::{MessageContent, OutgoingMessage, TargetType};
use taskclaw_core::outcome::{ActionOutcome, codes};
use taskclaw_core::task::ActionKind;
use taskclaw_core::traits::Messenger;

use super::{ActionBackend, mismatched};

/// Hands messages to the configured messenger.
#[derive(Clone)]
pub struct MessageBackend {
    messenger: Arc<dyn Messenger>,
    default_platform: String,
}

impl MessageBackend {
    pub fn new(messenger: Arc<dyn Messenger>, default_platform: &str) -> Self {
        Self {
            messenger,
            default_platform: default_platform.to_string(),
        }
    }

    /// Deliver text or a segment chain and describe the result.
    pub async fn deliver(
        &self,
        platform: Option<&str>,
        target_type: TargetType,
        target_id: &str,
        content: MessageContent,
    ) -> ActionOutcome {
        let platform = platform.filter(|p| !p.is_empty()).unwrap_or(&self.default_platform);
        if target_id.trim().is_empty() {
            return ActionOutcome::failed_with("message target_id is empty", codes::INVALID_CONFIG);
        }
        if content.to_plain_text().trim().is_empty() && content.image_count() == 0 {
            return ActionOutcome::failed_with("message is empty", codes::INVALID_CONFIG);
        }

        let text = content.to_plain_text();
        let images = content.image_count();
        let message = OutgoingMessage {
            platform: platform.to_string(),
            target_type,
            target_id: target_id.to_string(),
            content,
        };

        let report = self.messenger.send(&message).await;
        if !report.success {
            tracing::warn!("⚠️ Delivery via {} to {}:{} failed: {}", self.messenger.name(), target_type, target_id, report.message);
            return ActionOutcome::failed_with(format!("failed to send message: {}", report.message), codes::BACKEND_ERROR);
        }

        ActionOutcome::ok(format!("message sent to {platform}:{target_type}:{target_id}"))
            .with_data(json!({
                "platform": platform,
                "target_type": target_type.as_str(),
                "target_id": target_id,
                "message_length": text.chars().count(),
                "image_count": images,
            }))
            .export("sent_message", text)
            .export("target_platform", platform)
            .export("target_type", target_type.as_str())
            .export("target_id", target_id)
    }
}

#[async_trait]
impl ActionBackend for MessageBackend {
    fn kind(&self) -> &'static str {
        ActionKind::SEND_MESSAGE
    }

    async fn execute(&self, action: &ActionKind) -> ActionOutcome {
        let ActionKind::SendMessage(config) = action else {
            return mismatched("send_message", action);
        };
        self.deliver(
            config.platform.as_deref(),
            config.target_type,
            &config.target_id,
            MessageContent::Text(config.message.clone()),
        )
        .await
    }
}
