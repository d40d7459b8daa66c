//! The per-inbound-message orchestrator: build context → call the LLM →
//! execute tool calls → feed results back → iterate until a final reply
//! or the iteration ceiling. Also the process-level run loop that
//! serializes all inbound events through one logical consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use robun_config::AgentsConfig;
use robun_core::{
    InboundEvent, MessageBus, OutboundEvent, Result, RobunError, SessionMessage,
};
use robun_llm::{ChatMessage, ChatOptions, ChatOutcome, LlmProvider};

use crate::consolidate::Consolidator;
use crate::context::ContextBuilder;
use crate::memory::MemoryStore;
use crate::session::SessionStore;
use crate::skills::SkillSet;
use crate::tools::{ToolContext, ToolRegistry};

/// Nudge appended after each turn's tool results.
pub const REFLECTION_PROMPT: &str = "Reflect on the results and decide next steps.";

/// Surfaced when the tool loop hits the iteration ceiling without a final
/// answer.
pub const NO_RESPONSE_FALLBACK: &str = "I've completed processing but have no response to give.";

const NEW_SESSION_ACK: &str =
    "New session started. The previous conversation is being archived to memory.";

const HELP_TEXT: &str = "Commands:\n\
    /new — start a fresh session (the previous conversation is archived to memory)\n\
    /help — show this help";

/// Model parameters for the main agent.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_iterations: u32,
    pub memory_window: usize,
}

impl From<&AgentsConfig> for AgentOptions {
    fn from(config: &AgentsConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_tool_iterations: config.max_tool_iterations,
            memory_window: config.memory_window,
        }
    }
}

/// Run the function-calling loop over a message list.
///
/// Each assistant turn carrying `k` tool calls is answered by exactly `k`
/// tool messages with matching ids, in order, followed by one reflection
/// user message. Returns `Ok((None, tools))` when the ceiling is hit;
/// provider failures come back as `RobunError::Provider`.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    registry: &ToolRegistry,
    ctx: &ToolContext,
    messages: &mut Vec<ChatMessage>,
    options: &ChatOptions,
    max_iterations: u32,
) -> Result<(Option<String>, Vec<String>)> {
    let mut tools_used: Vec<String> = Vec::new();

    for iteration in 1..=max_iterations {
        match provider.chat(messages, options).await {
            ChatOutcome::Text { content, .. } => {
                debug!(iteration, "final answer");
                return Ok((Some(content), tools_used));
            }
            ChatOutcome::Error { message } => {
                return Err(RobunError::Provider(message));
            }
            ChatOutcome::ToolCalls { calls, content, .. } => {
                debug!(iteration, calls = calls.len(), "tool turn");
                messages.push(ChatMessage::assistant_with_calls(content, calls.clone()));
                for call in &calls {
                    let result = registry.execute(ctx, &call.name, &call.arguments).await;
                    tools_used.push(call.name.clone());
                    messages.push(ChatMessage::tool(&call.id, result));
                }
                // The nudge goes after all of this turn's results, never
                // between them.
                messages.push(ChatMessage::user(REFLECTION_PROMPT));
            }
        }
    }

    warn!(max_iterations, "tool loop ceiling reached");
    Ok((None, tools_used))
}

/// The agent execution kernel for one process.
pub struct AgentLoop {
    bus: Arc<MessageBus>,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    memory: Arc<MemoryStore>,
    consolidator: Arc<Consolidator>,
    context: ContextBuilder,
    options: AgentOptions,
    stopped: AtomicBool,
}

impl AgentLoop {
    pub fn new(
        bus: Arc<MessageBus>,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        memory: Arc<MemoryStore>,
        consolidator: Arc<Consolidator>,
        context: ContextBuilder,
        options: AgentOptions,
    ) -> Self {
        Self {
            bus,
            provider,
            registry,
            sessions,
            memory,
            consolidator,
            context,
            options,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Process one inbound event end-to-end and return the reply, if any.
    pub async fn process_message(
        &self,
        event: InboundEvent,
        session_key_override: Option<String>,
    ) -> Result<Option<OutboundEvent>> {
        if event.is_system() && session_key_override.is_none() {
            return self.process_system_message(event).await;
        }

        let key = session_key_override.unwrap_or_else(|| event.session_key());

        // Slash commands short-circuit before any LLM work.
        let command = event.content.trim().to_lowercase();
        if command == "/new" {
            return self.handle_new(&key, &event).await.map(Some);
        }
        if command == "/help" {
            return Ok(Some(OutboundEvent::new(
                &event.channel,
                &event.chat_id,
                HELP_TEXT,
            )));
        }

        let session = self.sessions.get_or_create(&key).await;
        if session.messages.len() > self.options.memory_window {
            let consolidator = self.consolidator.clone();
            let key = key.clone();
            tokio::spawn(async move { consolidator.consolidate_incremental(&key).await });
        }

        let reply = self
            .run_turn(&key, &event.content, &event.media, &event.channel, &event.chat_id)
            .await?;
        Ok(Some(reply))
    }

    /// `/new`: snapshot the transcript, clear the session, persist,
    /// invalidate the cache entry, and archive the snapshot in the
    /// background.
    async fn handle_new(&self, key: &str, event: &InboundEvent) -> Result<OutboundEvent> {
        let mut session = self.sessions.get_or_create(key).await;
        let snapshot = std::mem::take(&mut session.messages);
        session.last_consolidated = 0;
        session.updated_at = Utc::now();
        self.sessions.save(&session).await?;
        self.sessions.invalidate(key).await;

        if !snapshot.is_empty() {
            let consolidator = self.consolidator.clone();
            let key = key.to_string();
            tokio::spawn(async move { consolidator.archive(&key, snapshot).await });
        }
        info!(key, "session cleared");
        Ok(OutboundEvent::new(
            &event.channel,
            &event.chat_id,
            NEW_SESSION_ACK,
        ))
    }

    /// An event on the `system` channel carries the origin session key in
    /// its chat id; the reply goes back to the origin conversation, and
    /// the stored user entry is prefixed to make the synthetic origin
    /// auditable.
    async fn process_system_message(&self, event: InboundEvent) -> Result<Option<OutboundEvent>> {
        let Some((origin_channel, origin_chat)) = event.chat_id.split_once(':') else {
            warn!(chat = %event.chat_id, "malformed system chat id — dropping event");
            return Ok(None);
        };
        let key = event.chat_id.clone();
        let user_entry = format!("[System: {}] {}", event.sender_id, event.content);
        let reply = self
            .run_turn(&key, &user_entry, &[], origin_channel, origin_chat)
            .await?;
        Ok(Some(reply))
    }

    /// Synchronous injection path used by cron jobs, the heartbeat, and
    /// the HTTP gateway. Returns the assistant reply text.
    pub async fn process_direct(
        &self,
        content: &str,
        session_key: &str,
        channel: Option<&str>,
        chat_id: Option<&str>,
    ) -> Result<String> {
        let event = InboundEvent::new(
            channel.unwrap_or("cli"),
            "direct",
            chat_id.unwrap_or("direct"),
            content,
        );
        match self
            .process_message(event, Some(session_key.to_string()))
            .await?
        {
            Some(reply) => Ok(reply.content),
            None => Ok(String::new()),
        }
    }

    /// One LLM turn: context build, tool loop, transcript append, persist.
    async fn run_turn(
        &self,
        key: &str,
        user_content: &str,
        media: &[std::path::PathBuf],
        reply_channel: &str,
        reply_chat: &str,
    ) -> Result<OutboundEvent> {
        let mut session = self.sessions.get_or_create(key).await;
        let ctx = ToolContext::for_chat(reply_channel, reply_chat);

        let memory = self.memory.read_memory().await;
        let skills = SkillSet::discover(self.context.workspace());
        let system_prompt = self.context.system_prompt(&memory, &skills, &[]).await;
        let mut messages = self
            .context
            .build_messages(
                system_prompt,
                &session.messages,
                user_content,
                media,
                self.options.memory_window,
            )
            .await;

        let chat_options = ChatOptions {
            model: self.options.model.clone(),
            tools: self.registry.specs(),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let (content, tools_used) = match run_tool_loop(
            self.provider.as_ref(),
            &self.registry,
            &ctx,
            &mut messages,
            &chat_options,
            self.options.max_tool_iterations,
        )
        .await
        {
            Ok((Some(content), tools)) => (content, tools),
            Ok((None, tools)) => (NO_RESPONSE_FALLBACK.to_string(), tools),
            // Transient transport failure: the reply carries the error
            // text instead of crashing the run loop.
            Err(RobunError::Provider(message)) => (message, Vec::new()),
            Err(e) => return Err(e),
        };

        session.messages.push(SessionMessage::user(user_content));
        session
            .messages
            .push(SessionMessage::assistant(&content).with_tools_used(tools_used));
        session.updated_at = Utc::now();
        self.sessions.save(&session).await?;

        Ok(OutboundEvent::new(reply_channel, reply_chat, content))
    }

    /// The single-consumer run loop. Processes inbound events strictly
    /// sequentially; failures become an outbound apology and the loop
    /// continues. Only `stop()` terminates it.
    pub async fn run(&self) {
        info!("agent loop started");
        while !self.stopped.load(Ordering::SeqCst) {
            let event = match self.bus.consume_inbound(Duration::from_secs(1)).await {
                Ok(event) => event,
                Err(RobunError::Timeout) => continue,
                Err(e) => {
                    warn!(error = %e, "inbound queue failed — agent loop exiting");
                    break;
                }
            };

            let reply_channel = event.channel.clone();
            let reply_chat = event.chat_id.clone();
            match self.process_message(event, None).await {
                Ok(Some(reply)) => self.bus.publish_outbound(reply),
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "failed to process inbound event");
                    self.bus.publish_outbound(OutboundEvent::new(
                        reply_channel,
                        reply_chat,
                        format!("Sorry, I hit an error while processing your message: {e}"),
                    ));
                }
            }
        }
        info!("agent loop stopped");
    }

    /// Cooperative stop: the current event finishes; the consumer exits
    /// after its next timed-out receive.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
