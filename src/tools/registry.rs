//! Tool registry
//!
//! Name-indexed map of tools with uniform invocation. Every outcome of
//! `execute` — unknown tool, parameter violations, executor failure — comes
//! back as the textual result, because results flow into the LLM
//! transcript and must always be strings.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::providers::ToolDefinition;

use super::{Tool, ToolContext};

/// Registry of callable tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any existing tool of the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Names of all registered tools.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Tool definitions for the LLM request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Execute a tool. Always returns text.
    ///
    /// Unknown name, parameter violations, and executor errors are all
    /// formatted into the returned string.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!("Error: Tool '{}' not found", name);
        };

        let violations = tool.validate_params(&args);
        if !violations.is_empty() {
            return format!(
                "Error: Invalid parameters for tool '{}': {}",
                name,
                violations.join("; ")
            );
        }

        let start = Instant::now();
        match tool.execute(cancel, args, ctx).await {
            Ok(result) => {
                info!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                result
            }
            Err(e) => {
                error!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Tool execution failed"
                );
                format!("Error executing {}: {}", name, e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the provided message"
        }
        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"],
            })
        }
        async fn execute(
            &self,
            _cancel: &CancellationToken,
            args: Value,
            _ctx: &ToolContext,
        ) -> Result<String> {
            Ok(args["message"].as_str().unwrap_or_default().to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(
            &self,
            _cancel: &CancellationToken,
            _args: Value,
            _ctx: &ToolContext,
        ) -> Result<String> {
            Err(crate::error::NanoError::Tool("deliberate failure".into()))
        }
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(Box::new(EchoTool));
        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().name(), "echo");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_overwrites_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(EchoTool));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert!(defs[0].parameters.is_object());
    }

    #[tokio::test]
    async fn test_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&cancel(), "echo", json!({"message": "hello"}), &ToolContext::new())
            .await;
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_text() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute(&cancel(), "nope", json!({}), &ToolContext::new())
            .await;
        assert_eq!(result, "Error: Tool 'nope' not found");
    }

    #[tokio::test]
    async fn test_invalid_params_is_text() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&cancel(), "echo", json!({}), &ToolContext::new())
            .await;
        assert!(result.starts_with("Error: Invalid parameters for tool 'echo'"));
        assert!(result.contains("missing required parameter: message"));
    }

    #[tokio::test]
    async fn test_executor_failure_is_text() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));

        let result = registry
            .execute(&cancel(), "fail", json!({}), &ToolContext::new())
            .await;
        assert!(result.contains("Error executing fail"));
        assert!(result.contains("deliberate failure"));
    }
}
