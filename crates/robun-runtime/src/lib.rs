//! # robun-runtime
//!
//! The agent execution kernel: the per-session agent loop with its tool
//! dispatch and function-calling protocol, the session store and memory
//! consolidation, the sub-agent manager, the cron scheduler, the heartbeat
//! service, and the built-in tool set.

pub mod agent;
pub mod consolidate;
pub mod context;
pub mod cron;
pub mod heartbeat;
pub mod memory;
pub mod session;
pub mod skills;
pub mod subagent;
pub mod tools;

pub use agent::{AgentLoop, AgentOptions, run_tool_loop};
pub use consolidate::Consolidator;
pub use context::ContextBuilder;
pub use cron::{
    CronJob, CronJobState, CronPayload, CronPayloadKind, CronRunStatus, CronSchedule, CronService,
    CronStatus, NewCronJob, OnJob, compute_next_run,
};
pub use heartbeat::{HEARTBEAT_PROMPT, HEARTBEAT_SESSION_KEY, HeartbeatService, has_actionable_content};
pub use memory::MemoryStore;
pub use session::{Session, SessionStore, SessionSummary};
pub use skills::{Skill, SkillSet};
pub use subagent::SubAgentManager;
pub use tools::{Tool, ToolContext, ToolRegistry};
