//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured outcomes without making any HTTP calls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use robun_core::ToolCall;

use crate::provider::*;

/// A queued outcome for the mock provider.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Error(String),
}

/// Scripted provider: pops queued outcomes in order and records every
/// request for assertions.
pub struct MockProvider {
    outcomes: Arc<Mutex<Vec<MockOutcome>>>,
    /// Transcripts received, one per chat call.
    pub requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    /// Outcome repeated once the queue runs dry (defaults to a marker text).
    exhausted: MockOutcome,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            exhausted: MockOutcome::Text("(mock: no more queued responses)".into()),
        }
    }

    /// Queue a plain text reply.
    pub fn with_text(self, text: &str) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push(MockOutcome::Text(text.to_string()));
        self
    }

    /// Queue a single tool call.
    pub fn with_tool_call(self, id: &str, name: &str, arguments: serde_json::Value) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push(MockOutcome::ToolCalls(vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }]));
        self
    }

    /// Queue a multi-call assistant turn.
    pub fn with_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push(MockOutcome::ToolCalls(calls));
        self
    }

    /// Queue a transport-style failure.
    pub fn with_error(self, message: &str) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push(MockOutcome::Error(message.to_string()));
        self
    }

    /// Replace the outcome returned when the queue is exhausted. Useful for
    /// "always returns tool calls" ceiling tests.
    pub fn on_exhausted(mut self, outcome: MockOutcome) -> Self {
        self.exhausted = outcome;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_outcome(&self) -> MockOutcome {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            self.exhausted.clone()
        } else {
            outcomes.remove(0)
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, messages: &[ChatMessage], _options: &ChatOptions) -> ChatOutcome {
        self.requests.lock().unwrap().push(messages.to_vec());
        let usage = Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        match self.next_outcome() {
            MockOutcome::Text(content) => ChatOutcome::Text {
                content,
                usage,
                reasoning: None,
            },
            MockOutcome::ToolCalls(calls) => ChatOutcome::ToolCalls {
                calls,
                content: None,
                usage,
                reasoning: None,
            },
            MockOutcome::Error(message) => ChatOutcome::Error { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> ChatOptions {
        ChatOptions {
            model: "mock".into(),
            tools: vec![],
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn outcomes_pop_in_order() {
        let provider = MockProvider::new().with_text("first").with_text("second");
        let a = provider.chat(&[], &options()).await;
        let b = provider.chat(&[], &options()).await;
        assert!(matches!(a, ChatOutcome::Text { content, .. } if content == "first"));
        assert!(matches!(b, ChatOutcome::Text { content, .. } if content == "second"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn tool_call_outcome() {
        let provider =
            MockProvider::new().with_tool_call("t1", "read_file", json!({"path": "/tmp/a"}));
        match provider.chat(&[], &options()).await {
            ChatOutcome::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "read_file");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_outcome_repeats() {
        let provider = MockProvider::new().on_exhausted(MockOutcome::ToolCalls(vec![ToolCall {
            id: "loop".into(),
            name: "exec".into(),
            arguments: json!({"command": "true"}),
        }]));
        for _ in 0..5 {
            assert!(matches!(
                provider.chat(&[], &options()).await,
                ChatOutcome::ToolCalls { .. }
            ));
        }
    }

    #[tokio::test]
    async fn error_outcome() {
        let provider = MockProvider::new().with_error("HTTP 500");
        assert!(matches!(
            provider.chat(&[], &options()).await,
            ChatOutcome::Error { message } if message.contains("500")
        ));
    }
}
