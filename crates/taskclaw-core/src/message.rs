//! Outgoing message types handed to the messaging collaborator.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of recipient a message is addressed to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    #[default]
    Group,
    #[serde(alias = "user")]
    Private,
    Channel,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Private => "private",
            Self::Channel => "channel",
        }
    }

    /// Parse the config form. `user` is accepted for `private`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "group" => Some(Self::Group),
            "private" | "user" => Some(Self::Private),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a structured message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MessageSegment {
    Text(String),
    ImageUrl(String),
    ImagePath(PathBuf),
}

/// Either a flat text message or an ordered list of segments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Chain(Vec<MessageSegment>),
}

impl MessageContent {
    /// Plain-text rendering, images shown as placeholders.
    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Chain(segments) => segments
                .iter()
                .map(|s| match s {
                    MessageSegment::Text(t) => t.clone(),
                    MessageSegment::ImageUrl(url) => format!("[image: {url}]"),
                    MessageSegment::ImagePath(path) => format!("[image: {}]", path.display()),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn image_count(&self) -> usize {
        match self {
            Self::Text(_) => 0,
            Self::Chain(segments) => segments
                .iter()
                .filter(|s| !matches!(s, MessageSegment::Text(_)))
                .count(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A message addressed to one recipient on one platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub platform: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub content: MessageContent,
}

/// What the messenger reports back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReport {
    pub success: bool,
    pub message: String,
}

impl DeliveryReport {
    pub fn delivered(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}
