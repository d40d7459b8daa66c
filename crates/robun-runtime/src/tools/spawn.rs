//! The `spawn` tool: delegates a self-contained task to the sub-agent
//! manager. The origin conversation comes from the per-turn tool context,
//! so the result announcement finds its way back.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use robun_core::Result;

use super::{Tool, ToolContext};
use crate::subagent::SubAgentManager;

pub struct SpawnTool {
    manager: Arc<SubAgentManager>,
}

impl SpawnTool {
    pub fn new(manager: Arc<SubAgentManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Run a self-contained task in a background sub-agent. The result is \
         announced in this conversation when it completes."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "Complete task description for the sub-agent" },
                "label": { "type": "string", "description": "Short human-readable label" }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> Result<String> {
        let task = args["task"].as_str().unwrap_or_default();
        let label = args["label"].as_str();

        let (Some(channel), Some(chat_id)) = (ctx.channel.as_deref(), ctx.chat_id.as_deref())
        else {
            return Ok(
                "Error: spawn requires an active conversation to deliver its result to.".into(),
            );
        };

        Ok(self.manager.spawn(task, label, channel, chat_id).await)
    }
}
