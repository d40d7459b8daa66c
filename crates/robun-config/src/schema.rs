use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration — maps to `robun.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobunConfig {
    pub agents: AgentsConfig,
    pub providers: HashMap<String, ProviderConfig>,
    pub channels: HashMap<String, ChannelConfig>,
    pub tools: ToolsConfig,
    pub heartbeat: HeartbeatConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

// ── Agents ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Workspace root: bootstrap files, memory/, skills/, sessions live here.
    pub workspace: PathBuf,
    /// Model identifier passed through to the provider.
    pub model: String,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tool-loop iterations before forcing a stop.
    pub max_tool_iterations: u32,
    /// Number of most recent transcript messages visible to the LLM.
    pub memory_window: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model: "gpt-4o".into(),
            max_tokens: 4096,
            temperature: 0.7,
            max_tool_iterations: 20,
            memory_window: 50,
        }
    }
}

fn default_workspace() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".robun")
        .join("workspace")
}

// ── Providers ──────────────────────────────────────────────────

/// Per-provider connection settings, keyed by provider name in the
/// `[providers]` table (e.g. `openai`, `openrouter`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints.
    pub api_base: Option<String>,
    /// Extra HTTP headers sent with every request.
    pub extra_headers: HashMap<String, String>,
}

// ── Channels ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// Allowed sender identifiers. Empty = adapter default policy.
    pub allow_from: Vec<String>,
    /// Adapter-specific settings (tokens, endpoints, ...).
    #[serde(flatten)]
    pub settings: HashMap<String, serde_json::Value>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_from: vec![],
            settings: HashMap::new(),
        }
    }
}

// ── Tools ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Shell exec timeout in seconds.
    pub exec_timeout_secs: u64,
    /// Restrict file and shell tools to the workspace.
    pub restrict_to_workspace: bool,
    /// Brave Search API key for the web_search tool.
    pub web_search_api_key: Option<String>,
    /// External MCP servers, name → endpoint. Registration of their tools
    /// happens outside the core.
    pub mcp_servers: HashMap<String, String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 60,
            restrict_to_workspace: true,
            web_search_api_key: None,
            mcp_servers: HashMap::new(),
        }
    }
}

// ── Heartbeat ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 1800,
        }
    }
}

// ── Gateway ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3900,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

impl RobunConfig {
    /// Validate the config. Returns warnings; errors fail the load.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.agents.model.is_empty() {
            errors.push("agents.model is empty".to_string());
        }
        if self.agents.max_tokens == 0 {
            errors.push("agents.max_tokens is 0 — agent cannot produce output".to_string());
        }
        if !(0.0..=2.0).contains(&self.agents.temperature) {
            errors.push(format!(
                "agents.temperature {} out of range 0.0–2.0",
                self.agents.temperature
            ));
        }
        if self.agents.max_tool_iterations == 0 {
            errors.push("agents.max_tool_iterations must be at least 1".to_string());
        }
        if self.agents.memory_window < 2 {
            warnings.push("agents.memory_window < 2 — the LLM will see almost no history".into());
        }
        if self.tools.exec_timeout_secs == 0 {
            warnings.push("tools.exec_timeout_secs is 0 — shell commands never time out".into());
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(format!("unknown logging.level '{}'", self.logging.level));
        }
        if self.gateway.host.starts_with("0.0.0.0") {
            warnings.push("gateway bound to 0.0.0.0 — reachable from all interfaces".into());
        }

        if !errors.is_empty() {
            return Err(format!("configuration errors:\n  - {}", errors.join("\n  - ")));
        }
        Ok(warnings)
    }

    /// A copy safe to expose over the gateway: credentials blanked out.
    pub fn sanitized(&self) -> RobunConfig {
        let mut copy = self.clone();
        for provider in copy.providers.values_mut() {
            if provider.api_key.is_some() {
                provider.api_key = Some("***".into());
            }
        }
        if copy.tools.web_search_api_key.is_some() {
            copy.tools.web_search_api_key = Some("***".into());
        }
        for channel in copy.channels.values_mut() {
            for value in channel.settings.values_mut() {
                *value = serde_json::Value::String("***".into());
            }
        }
        copy
    }
}
