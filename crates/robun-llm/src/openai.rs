use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use robun_core::{Role, ToolCall};

use crate::provider::*;
use crate::repair::parse_tool_arguments;

/// OpenAI-compatible chat-completions provider (works with OpenAI,
/// OpenRouter, Together, vLLM, and other compatible endpoints).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    extra_headers: HashMap<String, String>,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: "https://api.openai.com/v1".into(),
            extra_headers: HashMap::new(),
            provider_name: "openai".into(),
        }
    }

    /// Use a custom base URL (OpenRouter, Azure, vLLM, ...).
    pub fn with_api_base(mut self, url: impl Into<String>, name: impl Into<String>) -> Self {
        self.api_base = url.into();
        self.provider_name = name.into();
        self
    }

    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = headers;
        self
    }

    /// Translate the transcript to the chat-completions wire shape.
    fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
        let mut wire = Vec::with_capacity(messages.len());
        for msg in messages {
            match msg.role {
                Role::System | Role::User => {
                    let role = if msg.role == Role::System { "system" } else { "user" };
                    let content = match &msg.content {
                        ChatContent::Text(t) => json!(t),
                        ChatContent::Parts(parts) => {
                            json!(parts.iter().map(|p| json!(p)).collect::<Vec<_>>())
                        }
                    };
                    wire.push(json!({ "role": role, "content": content }));
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        wire.push(json!({ "role": "assistant", "content": msg.text_content() }));
                    } else {
                        let calls: Vec<Value> = msg
                            .tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": serde_json::to_string(&tc.arguments)
                                            .unwrap_or_else(|_| "{}".into()),
                                    }
                                })
                            })
                            .collect();
                        let text = msg.text_content();
                        let content = if text.is_empty() { Value::Null } else { json!(text) };
                        wire.push(json!({
                            "role": "assistant",
                            "content": content,
                            "tool_calls": calls,
                        }));
                    }
                }
                Role::Tool => {
                    wire.push(json!({
                        "role": "tool",
                        "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.text_content(),
                    }));
                }
            }
        }
        wire
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> ChatOutcome {
        let mut body = json!({
            "model": options.model,
            "messages": Self::wire_messages(messages),
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        if !options.tools.is_empty() {
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        debug!(model = %options.model, messages = messages.len(), "chat request");

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        for (name, value) in &self.extra_headers {
            request = request.header(name, value);
        }

        let resp = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "chat transport failure");
                return ChatOutcome::error(format!("LLM request failed: {e}"));
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return ChatOutcome::error(format!("LLM request failed: HTTP {status}: {text}"));
        }

        let data: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return ChatOutcome::error(format!("LLM response was not JSON: {e}")),
        };

        let choice = &data["choices"][0];
        let message = &choice["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"]
            .as_str()
            .map(|s| s.to_string());

        let usage = Usage {
            prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        let calls: Vec<ToolCall> = message["tool_calls"]
            .as_array()
            .map(|raw| {
                raw.iter()
                    .filter_map(|c| {
                        Some(ToolCall {
                            id: c["id"].as_str()?.to_string(),
                            name: c["function"]["name"].as_str()?.to_string(),
                            arguments: parse_tool_arguments(
                                c["function"]["arguments"].as_str().unwrap_or("{}"),
                            ),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if calls.is_empty() {
            ChatOutcome::Text {
                content,
                usage,
                reasoning,
            }
        } else {
            ChatOutcome::ToolCalls {
                calls,
                content: if content.is_empty() { None } else { Some(content) },
                usage,
                reasoning,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_for_tool_turns() {
        let messages = vec![
            ChatMessage::system("be helpful"),
            ChatMessage::user("read the file"),
            ChatMessage::assistant_with_calls(
                None,
                vec![ToolCall {
                    id: "t1".into(),
                    name: "read_file".into(),
                    arguments: json!({"path": "/tmp/a"}),
                }],
            ),
            ChatMessage::tool("t1", "contents"),
        ];

        let wire = OpenAiProvider::wire_messages(&messages);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert!(wire[2]["content"].is_null());
        assert_eq!(wire[2]["tool_calls"][0]["id"], "t1");
        assert_eq!(
            wire[2]["tool_calls"][0]["function"]["arguments"],
            json!(r#"{"path":"/tmp/a"}"#)
        );
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "t1");
    }

    #[test]
    fn wire_shape_for_media_parts() {
        let messages = vec![ChatMessage::user_parts(vec![
            ContentPart::Text {
                text: "what is this?".into(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,AAAA".into(),
                },
            },
        ])];

        let wire = OpenAiProvider::wire_messages(&messages);
        let parts = wire[0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(
            parts[1]["image_url"]["url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png")
        );
    }
}
