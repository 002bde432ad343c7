//! Tool trait and execution context
//!
//! A tool is a callable the LLM can invoke: unique name, description, JSON
//! Schema parameters, a validator returning a list of violations, and an
//! async executor given a cancellation handle and the parsed arguments.
//!
//! Every execution receives a [`ToolContext`] carrying the routing of the
//! turn being processed (channel, chat id) plus the workspace path, so
//! tools like `message` and `spawn` default to replying where the user
//! spoke without mutable registry state.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Trait all tools implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use tokio_util::sync::CancellationToken;
/// use nanogrip::tools::{Tool, ToolContext};
/// use nanogrip::error::Result;
///
/// struct PingTool;
///
/// #[async_trait]
/// impl Tool for PingTool {
///     fn name(&self) -> &str { "ping" }
///     fn description(&self) -> &str { "Replies with pong" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({"type": "object", "properties": {}, "required": []})
///     }
///     async fn execute(
///         &self,
///         _cancel: &CancellationToken,
///         _args: Value,
///         _ctx: &ToolContext,
///     ) -> Result<String> {
///         Ok("pong".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, used by the LLM to request it.
    fn name(&self) -> &str;

    /// Description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn parameters(&self) -> Value;

    /// Validate arguments, returning a list of violations (empty = valid).
    ///
    /// The default checks that every name in the schema's `required` array
    /// is present.
    fn validate_params(&self, args: &Value) -> Vec<String> {
        let mut violations = Vec::new();
        let schema = self.parameters();
        let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
            return violations;
        };
        for req in required {
            let Some(key) = req.as_str() else { continue };
            if args.get(key).map(|v| v.is_null()).unwrap_or(true) {
                violations.push(format!("missing required parameter: {}", key));
            }
        }
        violations
    }

    /// Run the tool. Errors are converted to text by the registry.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String>;
}

/// Execution context handed to each tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Channel of the turn being processed ("telegram", "cli", ...)
    pub channel: Option<String>,
    /// Chat id of the turn being processed
    pub chat_id: Option<String>,
    /// Workspace directory for file operations
    pub workspace: Option<String>,
}

impl ToolContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the routing (builder pattern).
    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    /// Set the workspace (builder pattern).
    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }
}

/// Extract a string argument, treating null/absent as `None`.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// Extract a numeric argument as f64.
pub(crate) fn num_arg(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(|v| v.as_f64())
}
