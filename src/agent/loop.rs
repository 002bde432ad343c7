//! Agent loop — the bounded LLM↔tool iteration at the heart of nanogrip
//!
//! One background task consumes the bus's inbound queue and dispatches each
//! message: command handling (`/new`, `/help`), the `"system"` channel path
//! for subagent announcements, and the iteration proper. Tool results feed
//! back into the transcript until the LLM produces a final text or the
//! iteration cap is reached. After the turn, the user message and final
//! reply are appended to the session, persisted, and memory consolidation
//! is triggered off the critical path.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::Config;
use crate::cron::AgentExecutor;
use crate::error::{NanoError, Result};
use crate::memory::MemoryStore;
use crate::providers::{ChatMessage, ChatOptions, LLMProvider, ToolDefinition};
use crate::session::{Session, SessionManager, SessionMessage};
use crate::tools::{ToolContext, ToolRegistry};

use super::context::ContextBuilder;

/// Reply when the iteration cap is hit without a final text.
const ITERATION_CAP_REPLY: &str =
    "I reached the tool iteration limit before finishing. Please try again or simplify the request.";
/// Reply when the LLM's final text is empty.
const EMPTY_REPLY: &str = "I've completed processing but have no response to give.";
/// Built-in help text.
const HELP_REPLY: &str =
    "🐈 nanogrip commands:\n/new — Start a new conversation\n/help — Show available commands";
/// Ceiling on a consolidation turn.
const CONSOLIDATION_TIMEOUT: Duration = Duration::from_secs(120);

/// The agent loop.
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<RwLock<ToolRegistry>>,
    bus: Arc<MessageBus>,
    sessions: Arc<SessionManager>,
    memory: Arc<MemoryStore>,
    context_builder: ContextBuilder,
    workspace: PathBuf,
    model: String,
    max_tokens: u32,
    temperature: f64,
    max_iterations: u32,
    memory_window: usize,
    running: AtomicBool,
    /// Session keys with a consolidation in flight. Shared with the
    /// background consolidation tasks.
    consolidating: Arc<Mutex<HashSet<String>>>,
}

impl AgentLoop {
    pub fn new(
        config: &Config,
        provider: Arc<dyn LLMProvider>,
        tools: Arc<RwLock<ToolRegistry>>,
        bus: Arc<MessageBus>,
        sessions: Arc<SessionManager>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        let workspace = config.workspace_path();
        let builtin_skills = Config::dir().join("skills");
        let defaults = &config.agents.defaults;

        Self {
            context_builder: ContextBuilder::new(
                &workspace,
                Some(builtin_skills),
                Arc::clone(&memory),
            ),
            provider,
            tools,
            bus,
            sessions,
            memory,
            workspace,
            model: defaults.model.clone(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            max_iterations: defaults.max_tool_iterations,
            memory_window: defaults.memory_window,
            running: AtomicBool::new(false),
            consolidating: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether the consume loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consume inbound messages until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Agent loop already running");
            return;
        }
        info!("Agent loop started");

        loop {
            let msg = match self.bus.consume_inbound(&cancel).await {
                Ok(msg) => msg,
                Err(NanoError::Cancelled) | Err(NanoError::BusClosed) => break,
                Err(e) => {
                    error!(error = %e, "Inbound consume failed");
                    continue;
                }
            };

            let request_id = uuid::Uuid::new_v4();
            let span = info_span!(
                "request",
                request_id = %request_id,
                channel = %msg.channel,
                chat_id = %msg.chat_id,
                sender = %msg.sender_id,
            );
            async {
                info!("Processing message");
                let start = std::time::Instant::now();

                match self.dispatch(&cancel, &msg).await {
                    Ok(reply) => {
                        info!(
                            latency_ms = start.elapsed().as_millis() as u64,
                            response_len = reply.content.len(),
                            "Request completed"
                        );
                        if let Err(e) = self.bus.publish_outbound(reply) {
                            error!(error = %e, "Failed to publish reply");
                        }
                    }
                    Err(NanoError::Cancelled) => {}
                    Err(e) => {
                        error!(
                            latency_ms = start.elapsed().as_millis() as u64,
                            error = %e,
                            "Request failed"
                        );
                        let (channel, chat_id) = reply_route(&msg);
                        let error_msg =
                            OutboundMessage::new(&channel, &chat_id, &format!("Error: {}", e));
                        self.bus.publish_outbound(error_msg).ok();
                    }
                }
            }
            .instrument(span)
            .await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
    }

    /// Process one message through the CLI-style direct entry: channel
    /// `"cli"`, chat id `"direct"`. Used by the interactive CLI and by
    /// cron agent mode (with the job's routing instead).
    pub async fn process_direct(&self, cancel: &CancellationToken, text: &str) -> Result<String> {
        let msg = InboundMessage::new("cli", "user", "direct", text);
        let reply = self.dispatch(cancel, &msg).await?;
        Ok(reply.content)
    }

    /// Dispatch one inbound message and produce the reply.
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        msg: &InboundMessage,
    ) -> Result<OutboundMessage> {
        // Subagent announcements arrive on the "system" channel with the
        // real origin packed into chat_id as "channel:chat_id".
        if msg.channel == "system" {
            return self.dispatch_system(cancel, msg).await;
        }

        let session_key = msg.session_key();

        if msg.content == "/new" {
            let fresh = Session::new(&session_key);
            self.sessions.save(&fresh).await?;
            self.sessions.invalidate(&session_key).await;
            return Ok(OutboundMessage::reply_to(msg, "新会话已创建"));
        }
        if msg.content == "/help" {
            return Ok(OutboundMessage::reply_to(msg, HELP_REPLY));
        }

        let reply = self
            .run_turn(
                cancel,
                &session_key,
                &msg.content,
                &msg.channel,
                &msg.chat_id,
                &msg.media,
                None,
            )
            .await?;

        Ok(OutboundMessage::reply_to(msg, &reply))
    }

    async fn dispatch_system(
        &self,
        cancel: &CancellationToken,
        msg: &InboundMessage,
    ) -> Result<OutboundMessage> {
        let (origin_channel, origin_chat_id) = match msg.chat_id.split_once(':') {
            Some((channel, chat_id)) => (channel.to_string(), chat_id.to_string()),
            None => ("cli".to_string(), msg.chat_id.clone()),
        };
        let session_key = format!("{}:{}", origin_channel, origin_chat_id);

        let reply = self
            .run_turn(
                cancel,
                &session_key,
                &msg.content,
                &origin_channel,
                &origin_chat_id,
                &[],
                Some(&format!("[System: {}] {}", msg.sender_id, msg.content)),
            )
            .await?;

        let reply = if reply.is_empty() {
            "Background task completed.".to_string()
        } else {
            reply
        };
        Ok(OutboundMessage::new(&origin_channel, &origin_chat_id, &reply))
    }

    /// One full turn: context build, bounded iteration, persistence, and
    /// the consolidation trigger. `persisted_user_content` overrides what
    /// gets written to the session as the user entry (system-path turns
    /// record an annotated form).
    #[allow(clippy::too_many_arguments)]
    async fn run_turn(
        &self,
        cancel: &CancellationToken,
        session_key: &str,
        content: &str,
        channel: &str,
        chat_id: &str,
        media: &[String],
        persisted_user_content: Option<&str>,
    ) -> Result<String> {
        let session_handle = self.sessions.get_or_create(session_key).await;
        // Hold the session lock for the whole turn so no two turns for the
        // same session interleave writes.
        let mut session = session_handle.lock().await;

        let mut messages = self.context_builder.build_messages(
            session.history(self.memory_window),
            content,
            channel,
            chat_id,
            media,
        );

        let tool_ctx = ToolContext::new()
            .with_channel(channel, chat_id)
            .with_workspace(&self.workspace.to_string_lossy());

        let final_content = self
            .run_iterations(cancel, &mut messages, &tool_ctx)
            .await?;

        let final_content = if final_content.is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            final_content
        };

        let user_entry = persisted_user_content.unwrap_or(content);
        session.add_message(SessionMessage::user(user_entry));
        session.add_message(SessionMessage::assistant(&final_content));
        self.sessions.save(&session).await?;
        drop(session);

        self.maybe_consolidate(session_key, &session_handle).await;

        Ok(final_content)
    }

    /// The bounded LLM↔tool iteration over a transient message array.
    async fn run_iterations(
        &self,
        cancel: &CancellationToken,
        messages: &mut Vec<ChatMessage>,
        tool_ctx: &ToolContext,
    ) -> Result<String> {
        let options = ChatOptions::new()
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        for iteration in 1..=self.max_iterations {
            let tool_defs = self.tools.read().await.definitions();

            let response = self
                .provider
                .chat(
                    cancel,
                    messages.clone(),
                    tool_defs,
                    Some(&self.model),
                    options.clone(),
                )
                .await?;

            if !response.has_tool_calls() {
                return Ok(response.content);
            }

            debug!(
                iteration,
                calls = response.tool_calls.len(),
                "Executing tool calls"
            );

            messages.push(ChatMessage::assistant_with_tools(
                &response.content,
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Invalid JSON in tool arguments");
                        serde_json::json!({})
                    }
                };

                let result = {
                    let tools = self.tools.read().await;
                    tools.execute(cancel, &call.name, args, tool_ctx).await
                };

                let mut preview: String = result.chars().take(500).collect();
                if preview.len() < result.len() {
                    preview.push_str("...");
                }
                debug!(tool = %call.name, result = %preview, "Tool result");

                // The LLM always sees the full result, only logs truncate.
                messages.push(ChatMessage::tool_result(&call.id, &call.name, &result));
            }
        }

        info!(
            max_iterations = self.max_iterations,
            "Tool loop reached iteration cap"
        );
        Ok(ITERATION_CAP_REPLY.to_string())
    }

    /// Schedule a background consolidation when the session has grown past
    /// half the memory window since the last one. Never runs on the user
    /// turn's critical path.
    async fn maybe_consolidate(&self, session_key: &str, session_handle: &Arc<Mutex<Session>>) {
        let keep_count = {
            let half = self.memory_window / 2;
            if half == 0 {
                10
            } else {
                half
            }
        };

        {
            let session = session_handle.lock().await;
            let total = session.message_count();
            if total <= keep_count || total - session.last_consolidated < keep_count {
                return;
            }
        }

        {
            let mut consolidating = self.consolidating.lock().await;
            if !consolidating.insert(session_key.to_string()) {
                return;
            }
        }

        info!(session = %session_key, "Scheduling memory consolidation");

        // Snapshot what the consolidation needs under the session lock;
        // the LLM call runs without it.
        let (slice, start, end) = {
            let session = session_handle.lock().await;
            let start = session.last_consolidated;
            let end = (start + keep_count).min(session.message_count());
            (session.messages[start..end].to_vec(), start, end)
        };

        if start >= end {
            self.consolidating.lock().await.remove(session_key);
            return;
        }

        let provider = Arc::clone(&self.provider);
        let tools = Arc::clone(&self.tools);
        let memory = Arc::clone(&self.memory);
        let sessions = Arc::clone(&self.sessions);
        let session_handle = Arc::clone(session_handle);
        let session_key = session_key.to_string();
        let model = self.model.clone();
        let consolidating = Arc::clone(&self.consolidating);

        tokio::spawn(async move {
            let result = tokio::time::timeout(
                CONSOLIDATION_TIMEOUT,
                consolidate(
                    provider, tools, memory, sessions, session_handle, &session_key, &model, slice,
                    end,
                ),
            )
            .await;
            match result {
                Ok(Ok(())) => info!(session = %session_key, "Memory consolidation complete"),
                Ok(Err(e)) => warn!(session = %session_key, error = %e, "Memory consolidation failed"),
                Err(_) => warn!(session = %session_key, "Memory consolidation timed out"),
            }
            consolidating.lock().await.remove(&session_key);
        });
    }
}

/// Where an error reply for `msg` should go: the parsed origin for system
/// messages, the message's own routing otherwise.
fn reply_route(msg: &InboundMessage) -> (String, String) {
    if msg.channel == "system" {
        if let Some((channel, chat_id)) = msg.chat_id.split_once(':') {
            return (channel.to_string(), chat_id.to_string());
        }
    }
    (msg.channel.clone(), msg.chat_id.clone())
}

/// The consolidation procedure: ask the LLM to summarize the slice with a
/// single `save_memory` tool available, then advance the cursor.
#[allow(clippy::too_many_arguments)]
async fn consolidate(
    provider: Arc<dyn LLMProvider>,
    tools: Arc<RwLock<ToolRegistry>>,
    memory: Arc<MemoryStore>,
    sessions: Arc<SessionManager>,
    session_handle: Arc<Mutex<Session>>,
    session_key: &str,
    model: &str,
    slice: Vec<SessionMessage>,
    new_cursor: usize,
) -> Result<()> {
    let mut lines = Vec::new();
    for msg in &slice {
        if msg.content.is_empty() {
            continue;
        }
        let timestamp: String = msg.timestamp.chars().take(16).collect();
        lines.push(format!("[{}] {}: {}", timestamp, msg.role, msg.content));
    }
    if lines.is_empty() {
        return Ok(());
    }

    let mut current_memory = memory.read_long_term();
    if current_memory.is_empty() {
        current_memory = "(empty)".to_string();
    }

    let prompt = format!(
        "Process this conversation and call the save_memory tool with your consolidation.\n\n\
         ## Current Long-term Memory\n{}\n\n\
         ## Conversation to Process\n{}\n\n\
         Respond by calling the save_memory tool with:\n\
         1. history_entry: A paragraph summarizing key events/decisions (start with [YYYY-MM-DD HH:MM])\n\
         2. memory_update: Updated long-term memory (include existing facts plus new ones, or unchanged if nothing new)",
        current_memory,
        lines.join("\n")
    );

    let messages = vec![
        ChatMessage::system(
            "You are a memory consolidation agent. Call the save_memory tool with your \
             consolidation of the conversation.",
        ),
        ChatMessage::user(&prompt),
    ];

    let save_memory_def: Vec<ToolDefinition> = {
        let registry = tools.read().await;
        registry
            .get("save_memory")
            .map(|t| vec![ToolDefinition::new(t.name(), t.description(), t.parameters())])
            .unwrap_or_default()
    };
    if save_memory_def.is_empty() {
        return Err(NanoError::Tool("save_memory tool not registered".into()));
    }

    let cancel = CancellationToken::new();
    let options = ChatOptions::new().with_max_tokens(4096).with_temperature(0.7);
    let response = provider
        .chat(&cancel, messages, save_memory_def, Some(model), options)
        .await?;

    let mut saved = false;
    for call in &response.tool_calls {
        if call.name == "save_memory" {
            let args: serde_json::Value = serde_json::from_str(&call.arguments).unwrap_or_default();
            let registry = tools.read().await;
            let result = registry
                .execute(&cancel, "save_memory", args, &ToolContext::new())
                .await;
            debug!(result = %result, "save_memory executed");
            saved = true;
        }
    }

    if !saved {
        info!(session = %session_key, "LLM did not call save_memory, skipping");
        return Ok(());
    }

    // Advance the cursor and persist.
    let session_snapshot = {
        let mut session = session_handle.lock().await;
        session.last_consolidated = new_cursor;
        session.clone()
    };
    sessions.save(&session_snapshot).await?;
    Ok(())
}

#[async_trait]
impl AgentExecutor for AgentLoop {
    async fn process_command(
        &self,
        cancel: &CancellationToken,
        command: &str,
        channel: &str,
        chat_id: &str,
    ) -> Result<String> {
        let session_key = format!("{}:{}", channel, chat_id);
        self.run_turn(cancel, &session_key, command, channel, chat_id, &[], None)
            .await
    }
}
