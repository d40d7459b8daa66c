use async_trait::async_trait;
use serde::Serialize;

use robun_core::{Role, ToolCall};

/// Content of one chat message: plain text, or heterogeneous parts when
/// the inbound event carried media.
#[derive(Debug, Clone)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    /// A data URI (`data:image/png;base64,...`) or remote URL.
    pub url: String,
}

/// One message in the transcript handed to the provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: ChatContent,
    /// For tool-role messages: the call this result answers.
    pub tool_call_id: Option<String>,
    /// For assistant-role messages: the tool calls it requested.
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: ChatContent::Text(content.into()),
            tool_call_id: None,
            tool_calls: vec![],
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: ChatContent::Parts(parts),
            tool_call_id: None,
            tool_calls: vec![],
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn carrying tool calls; content may be empty.
    pub fn assistant_with_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: ChatContent::Text(content.unwrap_or_default()),
            tool_call_id: None,
            tool_calls: calls,
        }
    }

    /// Tool-result message answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: ChatContent::Text(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: vec![],
        }
    }

    pub fn text_content(&self) -> String {
        match &self.content {
            ChatContent::Text(t) => t.clone(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A tool exposed to the provider: OpenAI function-calling shape.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema (draft-07 subset) of the parameters object.
    pub parameters: serde_json::Value,
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Outcome of one chat call. Transport failures map to `Error` — the
/// provider never raises to the caller.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    /// The model produced a final text answer.
    Text {
        content: String,
        usage: Usage,
        reasoning: Option<String>,
    },
    /// The model requested tool invocations; `content` may carry
    /// accompanying commentary.
    ToolCalls {
        calls: Vec<ToolCall>,
        content: Option<String>,
        usage: Usage,
        reasoning: Option<String>,
    },
    /// Transport or provider failure, as a human-readable message.
    Error { message: String },
}

impl ChatOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        ChatOutcome::Error {
            message: message.into(),
        }
    }
}

/// Trait implemented by each LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, e.g. "openai".
    fn name(&self) -> &str;

    /// Run one chat turn over the transcript.
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> ChatOutcome;
}
