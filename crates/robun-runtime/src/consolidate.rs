//! LLM-driven memory consolidation: folds older transcript messages into
//! the long-term memory artifacts so transcripts stay bounded without
//! losing information.
//!
//! Two modes: incremental (triggered when the transcript outgrows the
//! memory window; keeps the most recent half-window) and archive-all
//! (triggered by `/new`; consolidates the whole snapshot). Failures are
//! logged and swallowed — the transcript keeps growing and the next
//! threshold crossing retries.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

use robun_core::SessionMessage;
use robun_llm::{ChatMessage, ChatOptions, ChatOutcome, LlmProvider, loose_parse, strip_code_fences};

use crate::memory::MemoryStore;
use crate::session::SessionStore;

const CONSOLIDATION_SYSTEM: &str =
    "You are a memory consolidation agent. Respond only with valid JSON.";

pub struct Consolidator {
    provider: Arc<dyn LlmProvider>,
    memory: Arc<MemoryStore>,
    sessions: Arc<SessionStore>,
    model: String,
    memory_window: usize,
    locks: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl Consolidator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        memory: Arc<MemoryStore>,
        sessions: Arc<SessionStore>,
        model: impl Into<String>,
        memory_window: usize,
    ) -> Self {
        Self {
            provider,
            memory,
            sessions,
            model: model.into(),
            memory_window,
            locks: TokioMutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, key: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    /// Incremental mode: consolidate everything between the consolidation
    /// pointer and the most recent half-window, then advance the pointer.
    pub async fn consolidate_incremental(&self, key: &str) {
        let lock = self.lock_for(key).await;
        let Ok(_guard) = lock.try_lock() else {
            // An overlapping run is in flight; the latecomer backs off.
            warn!(key, "consolidation already running — skipping");
            return;
        };

        let session = self.sessions.get_or_create(key).await;
        let total = session.messages.len();
        if total <= self.memory_window {
            return;
        }
        let keep = self.memory_window / 2;
        let start = session.last_consolidated;
        let end = total - keep;
        if start >= end {
            return;
        }

        info!(key, start, end, total, "consolidating transcript slice");
        let slice = &session.messages[start..end];
        if !self.run(slice).await {
            return;
        }

        match self.sessions.advance_consolidated(key, start, end).await {
            Ok(true) => debug!(key, end, "consolidation pointer advanced"),
            Ok(false) => warn!(key, "consolidation pointer moved concurrently — not advanced"),
            Err(e) => warn!(key, error = %e, "failed to persist consolidation pointer"),
        }
    }

    /// Archive-all mode: consolidate an entire transcript snapshot (the
    /// `/new` flow clears the stored session before calling this).
    pub async fn archive(&self, key: &str, snapshot: Vec<SessionMessage>) {
        if snapshot.is_empty() {
            return;
        }
        let lock = self.lock_for(key).await;
        let Ok(_guard) = lock.try_lock() else {
            warn!(key, "consolidation already running — skipping archive");
            return;
        };
        info!(key, messages = snapshot.len(), "archiving full transcript");
        self.run(&snapshot).await;
    }

    /// One consolidation pass over a rendered slice. Returns true when the
    /// memory artifacts were updated.
    async fn run(&self, slice: &[SessionMessage]) -> bool {
        let transcript = render_slice(slice);
        let current_memory = self.memory.read_memory().await;

        let prompt = format!(
            "Consolidate this conversation into long-term memory.\n\n\
             ## Conversation\n{transcript}\n\n\
             ## Current long-term memory\n{}\n\n\
             Respond with a JSON object with exactly these keys:\n\
             - \"history_entry\": one summary paragraph of the conversation, prefixed with its date/time\n\
             - \"memory_update\": the full new long-term memory content (carry forward everything still true, fold in new durable facts)",
            if current_memory.trim().is_empty() {
                "(empty)"
            } else {
                current_memory.as_str()
            }
        );

        let options = ChatOptions {
            model: self.model.clone(),
            tools: vec![],
            max_tokens: 2048,
            temperature: 0.3,
        };
        let messages = vec![
            ChatMessage::system(CONSOLIDATION_SYSTEM),
            ChatMessage::user(prompt),
        ];

        let content = match self.provider.chat(&messages, &options).await {
            ChatOutcome::Text { content, .. } => content,
            ChatOutcome::ToolCalls { .. } => {
                warn!("consolidation model returned tool calls — aborting");
                return false;
            }
            ChatOutcome::Error { message } => {
                warn!(error = %message, "consolidation LLM call failed");
                return false;
            }
        };

        let Some((history_entry, memory_update)) = parse_consolidation(&content) else {
            warn!("consolidation response was not valid JSON — state unchanged");
            return false;
        };

        if let Err(e) = self.memory.append_history(&history_entry).await {
            warn!(error = %e, "failed to append HISTORY.md");
            return false;
        }
        if memory_update != current_memory {
            if let Err(e) = self.memory.write_memory(&memory_update).await {
                warn!(error = %e, "failed to write MEMORY.md");
                return false;
            }
        }
        true
    }
}

/// Render transcript messages as dated lines:
/// `[{timestamp[:16]}] {ROLE}[ [tools: ...]]: {content}`.
fn render_slice(messages: &[SessionMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let ts: String = m.timestamp.chars().take(16).collect();
            let tools = match &m.tools_used {
                Some(tools) if !tools.is_empty() => format!(" [tools: {}]", tools.join(", ")),
                _ => String::new(),
            };
            format!("[{ts}] {}{tools}: {}", m.role.label(), m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strict parse first, lenient repair second; `None` aborts with no state
/// change.
fn parse_consolidation(raw: &str) -> Option<(String, String)> {
    let cleaned = strip_code_fences(raw);
    let parsed: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(_) => loose_parse(cleaned)?,
    };
    let history_entry = parsed["history_entry"].as_str()?.to_string();
    let memory_update = parsed["memory_update"].as_str()?.to_string();
    Some((history_entry, memory_update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use robun_core::Role;
    use robun_llm::MockProvider;

    fn message(role: Role, content: &str, tools: Option<Vec<String>>) -> SessionMessage {
        let mut m = SessionMessage::new(role, content);
        m.timestamp = "2026-08-02T10:30:00+00:00".into();
        m.tools_used = tools;
        m
    }

    #[test]
    fn slice_rendering_format() {
        let messages = vec![
            message(Role::User, "hello", None),
            message(Role::Assistant, "hi", Some(vec!["exec".into(), "read_file".into()])),
        ];
        let rendered = render_slice(&messages);
        assert_eq!(
            rendered,
            "[2026-08-02T10:30] USER: hello\n\
             [2026-08-02T10:30] ASSISTANT [tools: exec, read_file]: hi"
        );
    }

    #[test]
    fn parse_accepts_fenced_and_lenient_json() {
        let fenced = "```json\n{\"history_entry\": \"[2026] did things\", \"memory_update\": \"facts\"}\n```";
        let (h, m) = parse_consolidation(fenced).unwrap();
        assert_eq!(h, "[2026] did things");
        assert_eq!(m, "facts");

        let trailing = "{\"history_entry\": \"h\", \"memory_update\": \"m\",}";
        assert!(parse_consolidation(trailing).is_some());

        assert!(parse_consolidation("nonsense").is_none());
        assert!(parse_consolidation("{\"history_entry\": \"only one key\"}").is_none());
    }

    async fn setup(
        provider: MockProvider,
        window: usize,
    ) -> (tempfile::TempDir, Arc<SessionStore>, Arc<MemoryStore>, Consolidator) {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::new(dir.path().join("sessions")).unwrap());
        let memory = Arc::new(MemoryStore::new(dir.path()));
        let consolidator = Consolidator::new(
            Arc::new(provider),
            memory.clone(),
            sessions.clone(),
            "mock",
            window,
        );
        (dir, sessions, memory, consolidator)
    }

    #[tokio::test]
    async fn incremental_appends_history_and_advances_pointer() {
        let provider = MockProvider::new()
            .with_text("{\"history_entry\": \"[2026-08-02] chatted\", \"memory_update\": \"user likes rust\"}");
        let (_dir, sessions, memory, consolidator) = setup(provider, 4).await;

        let mut session = sessions.get_or_create("cli:u1").await;
        for i in 0..6 {
            session.messages.push(message(Role::User, &format!("m{i}"), None));
        }
        sessions.save(&session).await.unwrap();

        consolidator.consolidate_incremental("cli:u1").await;

        let session = sessions.get_or_create("cli:u1").await;
        // keep = 4/2 = 2, so the pointer lands at 6 - 2 = 4.
        assert_eq!(session.last_consolidated, 4);
        assert!(memory.read_history().await.contains("[2026-08-02] chatted"));
        assert_eq!(memory.read_memory().await, "user likes rust");
    }

    #[tokio::test]
    async fn below_threshold_is_a_no_op() {
        let provider = MockProvider::new();
        let (_dir, sessions, memory, consolidator) = setup(provider, 10).await;

        let mut session = sessions.get_or_create("cli:u2").await;
        session.messages.push(message(Role::User, "hi", None));
        sessions.save(&session).await.unwrap();

        consolidator.consolidate_incremental("cli:u2").await;
        assert_eq!(memory.read_history().await, "");
        assert_eq!(
            sessions.get_or_create("cli:u2").await.last_consolidated,
            0
        );
    }

    #[tokio::test]
    async fn malformed_response_leaves_state_unchanged() {
        let provider = MockProvider::new().with_text("I refuse to emit JSON");
        let (_dir, sessions, memory, consolidator) = setup(provider, 2).await;

        let mut session = sessions.get_or_create("cli:u3").await;
        for i in 0..5 {
            session.messages.push(message(Role::User, &format!("m{i}"), None));
        }
        sessions.save(&session).await.unwrap();

        consolidator.consolidate_incremental("cli:u3").await;
        assert_eq!(memory.read_history().await, "");
        assert_eq!(memory.read_memory().await, "");
        assert_eq!(
            sessions.get_or_create("cli:u3").await.last_consolidated,
            0
        );
    }

    #[tokio::test]
    async fn archive_consolidates_snapshot() {
        let provider = MockProvider::new()
            .with_text("{\"history_entry\": \"[2026-08-02] archived session\", \"memory_update\": \"\"}");
        let (_dir, _sessions, memory, consolidator) = setup(provider, 4).await;

        let snapshot = vec![
            message(Role::User, "a", None),
            message(Role::Assistant, "b", None),
        ];
        consolidator.archive("cli:u4", snapshot).await;
        assert!(memory.read_history().await.contains("archived session"));
    }

    #[tokio::test]
    async fn memory_rewritten_only_when_changed() {
        let provider = MockProvider::new()
            .with_text("{\"history_entry\": \"[t] one\", \"memory_update\": \"same\"}")
            .with_text("{\"history_entry\": \"[t] two\", \"memory_update\": \"same\"}");
        let (_dir, _sessions, memory, consolidator) = setup(provider, 4).await;
        memory.write_memory("same").await.unwrap();

        consolidator
            .archive("cli:u5", vec![message(Role::User, "x", None)])
            .await;
        consolidator
            .archive("cli:u5", vec![message(Role::User, "y", None)])
            .await;

        assert_eq!(memory.read_memory().await, "same");
        let history = memory.read_history().await;
        assert!(history.contains("one"));
        assert!(history.contains("two"));
    }
}
