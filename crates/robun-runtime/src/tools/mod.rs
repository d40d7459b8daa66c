//! Named, schema-validated callable dispatch for the function-calling
//! protocol. Tools never raise to the caller — every outcome collapses
//! into a single result string handed back to the LLM as a tool message.

pub mod cron_tool;
pub mod fs;
pub mod message;
pub mod shell;
pub mod spawn;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use robun_config::ToolsConfig;
use robun_llm::ToolSpec;
use robun_core::Result;

pub use cron_tool::CronTool;
pub use fs::{EditFileTool, FsPolicy, ListDirTool, ReadFileTool, WriteFileTool};
pub use message::{MessageTool, OutboundPublisher};
pub use shell::ExecTool;
pub use spawn::SpawnTool;
pub use web::{WebFetchTool, WebSearchTool};

/// Per-inbound-event binding of default channel/chat for side-effect
/// tools. Populated by the agent loop from the current event and passed
/// explicitly at execute time — tool instances themselves are immutable.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub channel: Option<String>,
    pub chat_id: Option<String>,
}

impl ToolContext {
    pub fn for_chat(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            chat_id: Some(chat_id.into()),
        }
    }
}

/// A named callable exposed to the LLM.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name — the registry key.
    fn name(&self) -> &str;

    /// Human description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON-Schema (draft-07 subset) of the parameters object.
    fn schema(&self) -> Value;

    /// Run the tool. Expected failures come back as `Ok` strings with the
    /// `Error: ` prefix; `Err` is reserved for unexpected internal faults.
    async fn execute(&self, ctx: &ToolContext, args: &Value) -> Result<String>;
}

/// Registry of tools keyed by name. Names are globally unique at any
/// instant; re-registering a name replaces the previous tool.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!(tool = %tool.name(), "tool name re-registered — replacing");
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Function-calling specs for every registered tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.schema(),
            })
            .collect()
    }

    /// Validated dispatch. All outcomes — unknown tool, invalid arguments,
    /// execution failure — collapse into the returned string.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, args: &Value) -> String {
        let Some(tool) = self.get(name) else {
            return format!("Error: Tool '{name}' not found.");
        };

        if let Err(problems) = validate_args(&tool.schema(), args) {
            return format!("Invalid parameters: {}", problems.join(", "));
        }

        debug!(tool = name, "executing tool");
        match tool.execute(ctx, args).await {
            Ok(result) => result,
            Err(e) => format!("Error executing {name}: {e}"),
        }
    }
}

/// Validate `args` against a draft-07 subset schema: top-level object,
/// `required` properties, primitive `type`s, and `enum` membership.
/// Returns `{path}: {message}` entries on failure.
fn validate_args(schema: &Value, args: &Value) -> std::result::Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if !args.is_object() {
        problems.push(format!("$: expected an object, got {}", type_name(args)));
        return Err(problems);
    }
    let obj = args.as_object().unwrap();

    if let Some(required) = schema["required"].as_array() {
        for name in required.iter().filter_map(|v| v.as_str()) {
            if !obj.contains_key(name) {
                problems.push(format!("{name}: required property is missing"));
            }
        }
    }

    if let Some(properties) = schema["properties"].as_object() {
        for (name, prop_schema) in properties {
            let Some(value) = obj.get(name) else { continue };
            if value.is_null() {
                continue;
            }
            if let Some(expected) = prop_schema["type"].as_str() {
                if !type_matches(expected, value) {
                    problems.push(format!(
                        "{name}: expected {expected}, got {}",
                        type_name(value)
                    ));
                    continue;
                }
            }
            if let Some(allowed) = prop_schema["enum"].as_array() {
                if !allowed.contains(value) {
                    let choices: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                    problems.push(format!("{name}: must be one of {}", choices.join(", ")));
                }
            }
        }
    }

    if problems.is_empty() { Ok(()) } else { Err(problems) }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Assemble the full built-in registry used by the main agent.
pub fn builtin_registry(
    workspace: PathBuf,
    tools_config: &ToolsConfig,
    publish: OutboundPublisher,
    subagents: Arc<crate::subagent::SubAgentManager>,
    cron: Arc<crate::cron::CronService>,
) -> ToolRegistry {
    let policy = Arc::new(FsPolicy::new(
        workspace,
        tools_config.restrict_to_workspace,
    ));
    let client = reqwest::Client::new();

    let mut registry = isolated_registry(policy.clone(), tools_config, client);
    registry.register(Arc::new(MessageTool::new(publish)));
    registry.register(Arc::new(SpawnTool::new(subagents)));
    registry.register(Arc::new(CronTool::new(cron)));
    registry
}

/// The registry handed to sub-agents: file, shell, and web tools only —
/// no message, no spawn, no cron.
pub fn isolated_registry(
    policy: Arc<FsPolicy>,
    tools_config: &ToolsConfig,
    client: reqwest::Client,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new(policy.clone())));
    registry.register(Arc::new(WriteFileTool::new(policy.clone())));
    registry.register(Arc::new(EditFileTool::new(policy.clone())));
    registry.register(Arc::new(ListDirTool::new(policy.clone())));
    registry.register(Arc::new(ExecTool::new(
        policy,
        tools_config.exec_timeout_secs,
    )));
    registry.register(Arc::new(WebSearchTool::new(
        client.clone(),
        tools_config.web_search_api_key.clone(),
    )));
    registry.register(Arc::new(WebFetchTool::new(client)));
    registry
}
