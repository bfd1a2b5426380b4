//! Built-in messengers.
//!
//! Real chat delivery lives outside this crate. `LogMessenger` is the
//! fallback when nothing is configured, `WebhookMessenger` hands each
//! message to an HTTP endpoint as JSON.

use std::time::Duration;

use async_trait::async_trait;
use taskclaw_core::error::{Result, TaskclawError};
use taskclaw_core::message::{DeliveryReport, OutgoingMessage};
use taskclaw_core::traits::Messenger;

/// Logs every message and reports success.
#[derive(Debug, Default, Clone)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &OutgoingMessage) -> DeliveryReport {
        tracing::info!(
            "📨 [{}] {} {}: {}",
            message.platform,
            message.target_type,
            message.target_id,
            message.content.to_plain_text()
        );
        DeliveryReport::delivered("logged")
    }
}

/// POSTs `{platform, target_type, target_id, content}` to a URL.
/// Any 2xx response counts as delivered.
#[derive(Debug, Clone)]
pub struct WebhookMessenger {
    url: String,
    client: reqwest::Client,
}

impl WebhookMessenger {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("TaskClaw/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TaskclawError::Http(format!("Client error: {e}")))?;
        Ok(Self { url: url.to_string(), client })
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, message: &OutgoingMessage) -> DeliveryReport {
        match self.client.post(&self.url).json(message).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("📨 Webhook delivered to {} {}", message.target_type, message.target_id);
                DeliveryReport::delivered(format!("delivered ({})", resp.status().as_u16()))
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!("⚠️ Webhook returned {}: {}", status, body);
                DeliveryReport::failed(format!("webhook returned {}", status.as_u16()))
            }
            Err(e) => {
                tracing::warn!("⚠️ Webhook delivery failed: {}", e);
                DeliveryReport::failed(format!("webhook request failed: {e}"))
            }
        }
    }
}
