//! Test doubles shared by the module tests.

use std::sync::Mutex;

use async_trait::async_trait;
use taskclaw_core::message::{DeliveryReport, OutgoingMessage};
use taskclaw_core::traits::Messenger;

/// Keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<OutgoingMessage>>,
    fail: bool,
}

impl RecordingMessenger {
    /// Records, then reports every delivery as failed.
    pub fn failing() -> Self {
        Self { sent: Mutex::default(), fail: true }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &OutgoingMessage) -> DeliveryReport {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            DeliveryReport::failed("recipient unreachable")
        } else {
            DeliveryReport::delivered("ok")
        }
    }
}
