//! Fire-and-forget isolated agent executor. A sub-agent runs one
//! self-contained task in the background with a reduced tool set — file,
//! shell, and web tools only, so it cannot message users, spawn further
//! sub-agents, or schedule jobs — and its result re-enters the bus as a
//! synthetic system message addressed to the origin conversation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use robun_config::ToolsConfig;
use robun_core::{InboundEvent, MessageBus, SYSTEM_CHANNEL, short_id};
use robun_llm::{ChatMessage, ChatOptions, LlmProvider};

use crate::agent::{NO_RESPONSE_FALLBACK, run_tool_loop};
use crate::tools::{FsPolicy, ToolContext, isolated_registry};

/// Sub-agents get a lower iteration ceiling than the main loop.
const SUBAGENT_MAX_ITERATIONS: u32 = 15;

pub struct SubAgentManager {
    provider: Arc<dyn LlmProvider>,
    bus: Arc<MessageBus>,
    workspace: PathBuf,
    tools_config: ToolsConfig,
    model: String,
    max_tokens: u32,
    temperature: f32,
    active: TokioMutex<HashMap<String, JoinHandle<()>>>,
}

impl SubAgentManager {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        bus: Arc<MessageBus>,
        workspace: PathBuf,
        tools_config: ToolsConfig,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            bus,
            workspace,
            tools_config,
            model: model.into(),
            max_tokens,
            temperature,
            active: TokioMutex::new(HashMap::new()),
        }
    }

    /// Start a sub-agent and return an acknowledgement immediately. The
    /// result arrives later as a `system`-channel inbound event whose chat
    /// id encodes the origin session key.
    pub async fn spawn(
        self: &Arc<Self>,
        task: &str,
        label: Option<&str>,
        origin_channel: &str,
        origin_chat: &str,
    ) -> String {
        let id = short_id();
        let label = label
            .map(str::to_string)
            .unwrap_or_else(|| format!("task-{id}"));

        let manager = self.clone();
        let task_text = task.to_string();
        let task_label = label.clone();
        let task_id = id.clone();
        let origin = format!("{origin_channel}:{origin_chat}");

        let handle = tokio::spawn(async move {
            manager
                .run_task(&task_id, &task_label, &task_text, &origin)
                .await;
            manager.active.lock().await.remove(&task_id);
        });
        self.active.lock().await.insert(id.clone(), handle);

        info!(task_id = %id, label = %label, "spawned sub-agent");
        format!(
            "Sub-agent '{label}' started (id: {id}). It works in the background; \
             the result will be announced in this conversation when it finishes."
        )
    }

    async fn run_task(&self, id: &str, label: &str, task: &str, origin: &str) {
        let policy = Arc::new(FsPolicy::new(
            self.workspace.clone(),
            self.tools_config.restrict_to_workspace,
        ));
        let registry = isolated_registry(policy, &self.tools_config, reqwest::Client::new());

        let system_prompt = format!(
            "You are a sub-agent executing one isolated task.\n\
             Workspace: {}\n\
             You have file, shell, and web tools. You cannot send messages, \
             spawn further sub-agents, or schedule jobs. Work autonomously and \
             finish with a clear summary of what you did and found.",
            self.workspace.display(),
        );
        let mut messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(task),
        ];
        let options = ChatOptions {
            model: self.model.clone(),
            tools: registry.specs(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let outcome = run_tool_loop(
            self.provider.as_ref(),
            &registry,
            &ToolContext::default(),
            &mut messages,
            &options,
            SUBAGENT_MAX_ITERATIONS,
        )
        .await;

        let (status, result) = match outcome {
            Ok((Some(content), _)) => ("ok", content),
            Ok((None, _)) => ("ok", NO_RESPONSE_FALLBACK.to_string()),
            Err(e) => ("error", format!("Error: {e}")),
        };

        info!(task_id = %id, status, "sub-agent finished");
        let announcement = format!(
            "Subagent task '{label}' (id: {id}) finished.\n\
             Status: {status}\n\
             Task: {task}\n\
             Result:\n{result}\n\n\
             Report this result to the user in a brief, natural way — summarize rather than quoting it verbatim."
        );

        self.bus.publish_inbound(InboundEvent::new(
            SYSTEM_CHANNEL,
            "subagent",
            origin,
            announcement,
        ));
    }

    /// Number of sub-agents still running.
    pub async fn active_count(&self) -> usize {
        let mut active = self.active.lock().await;
        active.retain(|_, handle| !handle.is_finished());
        active.len()
    }

    /// Wait (up to `timeout`) for in-flight sub-agents to publish their
    /// announcements; abort whatever is still running afterwards.
    pub async fn shutdown(&self, timeout: Duration) {
        let handles: Vec<(String, JoinHandle<()>)> =
            self.active.lock().await.drain().collect();
        if handles.is_empty() {
            return;
        }
        info!(count = handles.len(), "waiting for in-flight sub-agents");

        let deadline = tokio::time::Instant::now() + timeout;
        for (id, handle) in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(task_id = %id, "sub-agent did not finish before shutdown — aborting");
                }
            }
        }
    }
}
