use thiserror::Error;

/// Unified error type for the robun runtime.
#[derive(Error, Debug)]
pub enum RobunError {
    // ── Bus errors ─────────────────────────────────────────────
    #[error("timed out waiting for inbound event")]
    Timeout,

    #[error("bus error: {0}")]
    Bus(String),

    // ── Agent / session errors ─────────────────────────────────
    #[error("agent error: {0}")]
    Agent(String),

    #[error("session error: {key}: {reason}")]
    Session { key: String, reason: String },

    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    Provider(String),

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    // ── Scheduling errors ──────────────────────────────────────
    #[error("cron error: {0}")]
    Cron(String),

    #[error("invalid schedule: {0}")]
    Schedule(String),

    // ── Memory errors ──────────────────────────────────────────
    #[error("memory error: {0}")]
    Memory(String),

    #[error("consolidation error: {0}")]
    Consolidation(String),

    // ── Channel errors ─────────────────────────────────────────
    #[error("channel error: {channel}: {reason}")]
    Channel { channel: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RobunError>;
