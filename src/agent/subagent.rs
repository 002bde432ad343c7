//! Subagent manager — detached background reasoning tasks
//!
//! `spawn` launches a reduced agent loop on its own task and returns
//! immediately with an acknowledgement carrying a short id. On completion
//! (success, LLM error, iteration cap, or cancellation) the result is
//! published back through the bus as a synthetic inbound message on the
//! `"system"` channel, with the real origin encoded in `chat_id` as
//! `"origin_channel:origin_chat_id"`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Local, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{InboundMessage, MessageBus};
use crate::providers::{ChatMessage, ChatOptions, LLMProvider};
use crate::tools::{ToolContext, ToolRegistry};

struct SubagentTask {
    label: String,
    cancel: CancellationToken,
}

/// Spawns and tracks background subagents.
///
/// All shared state is reference-counted so each spawned task carries its
/// own handle to the manager internals.
pub struct SubagentManager {
    provider: Arc<dyn LLMProvider>,
    workspace: PathBuf,
    bus: Arc<MessageBus>,
    tools: Arc<RwLock<ToolRegistry>>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    max_iterations: u32,
    tasks: Arc<Mutex<HashMap<String, SubagentTask>>>,
}

impl SubagentManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        workspace: PathBuf,
        bus: Arc<MessageBus>,
        tools: Arc<RwLock<ToolRegistry>>,
        model: &str,
        max_tokens: u32,
        temperature: f64,
        max_iterations: u32,
    ) -> Self {
        Self {
            provider,
            workspace,
            bus,
            tools,
            model: model.to_string(),
            max_tokens,
            temperature,
            max_iterations,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn worker(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            workspace: self.workspace.clone(),
            bus: Arc::clone(&self.bus),
            tools: Arc::clone(&self.tools),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            max_iterations: self.max_iterations,
            tasks: Arc::clone(&self.tasks),
        }
    }

    /// Launch a subagent and return an acknowledgement immediately.
    pub fn spawn(
        &self,
        task: &str,
        label: &str,
        origin_channel: &str,
        origin_chat_id: &str,
    ) -> String {
        let task_id = short_id();
        let display_label = if label.is_empty() {
            let mut truncated: String = task.chars().take(30).collect();
            if task.chars().count() > 30 {
                truncated.push_str("...");
            }
            truncated
        } else {
            label.to_string()
        };

        let cancel = CancellationToken::new();
        {
            let mut tasks = self.tasks.lock().expect("subagent task lock");
            tasks.insert(
                task_id.clone(),
                SubagentTask {
                    label: display_label.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        let manager = self.worker();
        let task = task.to_string();
        let label = display_label.clone();
        let origin_channel = origin_channel.to_string();
        let origin_chat_id = origin_chat_id.to_string();
        let id = task_id.clone();
        tokio::spawn(async move {
            manager
                .run_subagent(&id, &label, &task, &origin_channel, &origin_chat_id, cancel)
                .await;
            manager.tasks.lock().expect("subagent task lock").remove(&id);
        });

        info!(id = %task_id, label = %display_label, "Spawned subagent");
        format!(
            "Subagent [{}] started (id: {}). I'll notify you when it completes.",
            display_label, task_id
        )
    }

    /// Cancel one subagent. Returns whether it was running.
    pub fn cancel(&self, task_id: &str) -> bool {
        let mut tasks = self.tasks.lock().expect("subagent task lock");
        if let Some(task) = tasks.remove(task_id) {
            task.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Cancel every live subagent.
    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock().expect("subagent task lock");
        info!(count = tasks.len(), "Stopping subagents");
        for (id, task) in tasks.drain() {
            info!(id = %id, label = %task.label, "Cancelling subagent");
            task.cancel.cancel();
        }
    }

    /// Number of live subagents.
    pub fn running_count(&self) -> usize {
        self.tasks.lock().expect("subagent task lock").len()
    }

    async fn run_subagent(
        &self,
        task_id: &str,
        label: &str,
        task: &str,
        origin_channel: &str,
        origin_chat_id: &str,
        cancel: CancellationToken,
    ) {
        info!(id = %task_id, "Subagent starting task");

        let mut messages = vec![
            ChatMessage::system(&self.subagent_prompt()),
            ChatMessage::user(task),
        ];

        // Tools run with a workspace-only context: message/spawn without
        // explicit routing degrade to textual errors instead of reaching
        // users or nesting subagents.
        let ctx = ToolContext::new().with_workspace(&self.workspace.to_string_lossy());
        let options = ChatOptions::new()
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let mut final_result = String::new();

        for _ in 0..self.max_iterations {
            if cancel.is_cancelled() {
                info!(id = %task_id, "Subagent cancelled");
                return;
            }

            let tool_defs = self.tools.read().await.definitions();
            let response = match self
                .provider
                .chat(
                    &cancel,
                    messages.clone(),
                    tool_defs,
                    Some(&self.model),
                    options.clone(),
                )
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(id = %task_id, error = %e, "Subagent LLM call failed");
                    self.announce(task_id, label, task, &format!("Error: {}", e), origin_channel, origin_chat_id, "error");
                    return;
                }
            };

            if !response.has_tool_calls() {
                final_result = response.content;
                break;
            }

            messages.push(ChatMessage::assistant_with_tools(
                &response.content,
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let args: serde_json::Value =
                    serde_json::from_str(&call.arguments).unwrap_or_default();
                let result = {
                    let tools = self.tools.read().await;
                    tools.execute(&cancel, &call.name, args, &ctx).await
                };
                messages.push(ChatMessage::tool_result(&call.id, &call.name, &result));
            }
        }

        if final_result.is_empty() {
            final_result = "Task completed but no final response was generated.".to_string();
        }

        info!(id = %task_id, "Subagent completed");
        self.announce(task_id, label, task, &final_result, origin_channel, origin_chat_id, "ok");
    }

    /// Publish the result announcement as an inbound `"system"` message.
    #[allow(clippy::too_many_arguments)]
    fn announce(
        &self,
        task_id: &str,
        label: &str,
        task: &str,
        result: &str,
        origin_channel: &str,
        origin_chat_id: &str,
        status: &str,
    ) {
        let status_text = if status == "error" {
            "failed"
        } else {
            "completed successfully"
        };

        let content = format!(
            "[Subagent '{}' {}]\n\nTask: {}\n\nResult:\n{}\n\n\
             Summarize this naturally for the user. Keep it brief (1-2 sentences). \
             Do not mention technical details like \"subagent\" or task IDs.",
            label, status_text, task, result
        );

        let msg = InboundMessage::new(
            "system",
            "subagent",
            &format!("{}:{}", origin_channel, origin_chat_id),
            &content,
        );
        if let Err(e) = self.bus.publish_inbound(msg) {
            warn!(id = %task_id, error = %e, "Failed to announce subagent result");
        }
    }

    fn subagent_prompt(&self) -> String {
        let now = Local::now();
        format!(
            r#"# Subagent

## Current Time
{} ({})

You are a subagent spawned by the main agent to complete a specific task.

## Rules
1. Stay focused - complete only the assigned task, nothing else
2. Your final response will be reported back to the main agent
3. Do not initiate conversations or take on side tasks
4. Be concise but informative in your findings

## What You Can Do
- Read and write files in the workspace
- Execute shell commands
- Search the web

## What You Cannot Do
- Send messages directly to users
- Spawn other subagents
- Access the main agent's conversation history

## Workspace
Your workspace is at: {}

When you have completed the task, provide a clear summary of your findings or actions."#,
            now.format("%Y-%m-%d %H:%M (%A)"),
            now.format("%Z"),
            self.workspace.display(),
        )
    }
}

fn short_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{:x}", nanos).chars().take(8).collect()
}
