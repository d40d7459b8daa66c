//! # robun-llm
//!
//! The LLM capability interface: given a message transcript and tool
//! schemas, a provider returns either textual content or tool-call
//! requests. Ships an OpenAI-compatible HTTP provider and a scripted
//! mock for deterministic tests.

pub mod mock;
pub mod openai;
pub mod provider;
pub mod repair;

pub use mock::{MockOutcome, MockProvider};
pub use openai::OpenAiProvider;
pub use provider::{
    ChatContent, ChatMessage, ChatOptions, ChatOutcome, ContentPart, ImageUrl, LlmProvider,
    ToolSpec, Usage,
};
pub use repair::{loose_parse, parse_tool_arguments, strip_code_fences};
