use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Channel name reserved for sub-agent result injection. An inbound event on
/// this channel carries the origin session key in its `chat_id`.
pub const SYSTEM_CHANNEL: &str = "system";

/// A message flowing from a channel toward the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Channel identifier, e.g. "telegram", "discord". Never empty.
    pub channel: String,
    /// Sender identity within the channel.
    pub sender_id: String,
    /// Chat identity — uniquely addresses the conversation within the channel.
    pub chat_id: String,
    /// Text content.
    pub content: String,
    /// Wall-clock time the event was received.
    pub timestamp: DateTime<Utc>,
    /// Local media file paths, in the order the channel delivered them.
    #[serde(default)]
    pub media: Vec<PathBuf>,
    /// Free-form channel metadata.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InboundEvent {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            media: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// The session key `"{channel}:{chat_id}"` this event belongs to.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }

    /// Whether this is a synthetic event from the sub-agent manager.
    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }
}

/// A message flowing from the agent back out to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    /// Channel-specific message id to reply to, when supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub media: Vec<PathBuf>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl OutboundEvent {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: None,
            media: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }
}
