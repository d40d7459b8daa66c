//! The `message` tool: lets the agent push a message out-of-band, to the
//! current conversation by default or to an explicit channel/chat.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use robun_core::{OutboundEvent, Result};

use super::{Tool, ToolContext};

/// Callback injected at construction that hands the event to the bus.
pub type OutboundPublisher = Arc<dyn Fn(OutboundEvent) + Send + Sync>;

pub struct MessageTool {
    publish: OutboundPublisher,
}

impl MessageTool {
    pub fn new(publish: OutboundPublisher) -> Self {
        Self { publish }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to a chat. Defaults to the conversation currently being processed."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Message text to send" },
                "channel": { "type": "string", "description": "Target channel (defaults to the current one)" },
                "chat_id": { "type": "string", "description": "Target chat id (defaults to the current one)" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> Result<String> {
        let content = args["content"].as_str().unwrap_or_default();
        let channel = args["channel"]
            .as_str()
            .map(str::to_string)
            .or_else(|| ctx.channel.clone());
        let chat_id = args["chat_id"]
            .as_str()
            .map(str::to_string)
            .or_else(|| ctx.chat_id.clone());

        let (Some(channel), Some(chat_id)) = (channel, chat_id) else {
            return Ok(
                "Error: No target chat — provide channel and chat_id or call from a conversation."
                    .into(),
            );
        };

        (self.publish)(OutboundEvent::new(&channel, &chat_id, content));
        Ok(format!("Message sent to {channel}:{chat_id}"))
    }
}
