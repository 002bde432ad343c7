//! `spawn` tool — delegate a task to a background subagent.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

use super::types::str_arg;
use super::{Tool, ToolContext};

/// Function invoked to actually spawn the subagent:
/// `(task, label, origin_channel, origin_chat_id) -> acknowledgement`.
pub type SpawnFn = Box<dyn Fn(&str, &str, &str, &str) -> String + Send + Sync>;

/// Spawns detached background reasoning tasks.
///
/// Origin routing defaults to the turn's [`ToolContext`] so the result
/// announcement comes back to where the user spoke.
pub struct SpawnTool {
    spawn_fn: SpawnFn,
}

impl SpawnTool {
    pub fn new(spawn_fn: SpawnFn) -> Self {
        Self { spawn_fn }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to run a task in the background. The subagent runs independently \
         and will notify you when complete.\n\n\
         Use it for tasks taking more than a couple of minutes, parallel independent tasks, \
         or long-running monitoring. Don't use it for quick queries or tasks that depend on \
         each other — do those directly or sequentially."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task description for the subagent",
                },
                "label": {
                    "type": "string",
                    "description": "Optional human-readable label for the task",
                },
            },
            "required": ["task"],
        })
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String> {
        let Some(task) = str_arg(&args, "task") else {
            return Ok("Error: task is required".to_string());
        };
        let label = str_arg(&args, "label").unwrap_or_default();

        let Some(channel) = ctx.channel.as_deref() else {
            return Ok("Error: spawn is not available in this context".to_string());
        };
        let chat_id = ctx.chat_id.as_deref().unwrap_or("direct");

        Ok((self.spawn_fn)(task, label, channel, chat_id))
    }
}
