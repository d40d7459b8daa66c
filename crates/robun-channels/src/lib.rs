//! # robun-channels
//!
//! The contract between the core and its channel adapters. Wire-level
//! protocol drivers (Telegram, Discord, Slack, email, ...) live outside
//! the core: each one pushes inbound events onto the bus, subscribes to
//! its channel's outbound events, and enforces its own allow-list.

pub mod adapter;

pub use adapter::{AdapterSubscriber, ChannelAdapter, LoopbackChannel};
