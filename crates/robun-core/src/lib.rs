//! # robun-core
//!
//! Shared types for the robun agent runtime: inbound/outbound events,
//! session messages, tool-call records, the unified error type, and the
//! in-process message bus that decouples channel adapters from the agent
//! loop.

pub mod bus;
pub mod error;
pub mod event;
pub mod message;

pub use bus::{MessageBus, OutboundSubscriber};
pub use error::{Result, RobunError};
pub use event::{InboundEvent, OutboundEvent, SYSTEM_CHANNEL};
pub use message::{Role, SessionMessage, ToolCall};

use rand::Rng;

/// Generate an 8-character lowercase alphanumeric id, used for cron jobs
/// and sub-agent tasks.
pub fn short_id() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}
