//! `save_memory` tool — the write path of memory consolidation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::memory::MemoryStore;

use super::types::str_arg;
use super::{Tool, ToolContext};

/// Persists a consolidation result: appends a paragraph to `HISTORY.md` and
/// rewrites `MEMORY.md` in full.
pub struct SaveMemoryTool {
    store: Arc<MemoryStore>,
}

impl SaveMemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Save the memory consolidation result to persistent storage. Call this after \
         processing conversation history to update long-term memory and append to history."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "history_entry": {
                    "type": "string",
                    "description": "A paragraph (2-5 sentences) summarizing key events/decisions/topics. \
                                    Start with [YYYY-MM-DD HH:MM]. Include detail useful for grep search.",
                },
                "memory_update": {
                    "type": "string",
                    "description": "Full updated long-term memory as markdown. Include all existing \
                                    facts plus new ones. Return unchanged if nothing new.",
                },
            },
            "required": ["history_entry", "memory_update"],
        })
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        args: Value,
        _ctx: &ToolContext,
    ) -> Result<String> {
        let history_entry = str_arg(&args, "history_entry");
        let memory_update = str_arg(&args, "memory_update");

        if history_entry.is_none() && memory_update.is_none() {
            return Ok("Error: history_entry and memory_update are required".to_string());
        }

        if let Some(entry) = history_entry {
            if let Err(e) = self.store.append_history(entry) {
                return Ok(format!("Error saving history: {}", e));
            }
        }

        if let Some(update) = memory_update {
            // Skip the rewrite when nothing changed.
            if update != self.store.read_long_term() {
                if let Err(e) = self.store.write_long_term(update) {
                    return Ok(format!("Error saving memory: {}", e));
                }
            }
        }

        Ok("Memory saved successfully".to_string())
    }
}
