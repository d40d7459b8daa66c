//! # robun-config
//!
//! Configuration for the robun runtime: a nested, default-valued schema
//! loaded from TOML with `ROBUN_`-prefixed environment overrides
//! (`__` as the path separator).

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AgentsConfig, ChannelConfig, GatewayConfig, HeartbeatConfig, LoggingConfig, ProviderConfig,
    RobunConfig, ToolsConfig,
};
