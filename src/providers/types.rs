//! Provider types for nanogrip
//!
//! The `LLMProvider` trait plus the wire-level chat types. `ChatMessage` is
//! the request-side shape (session entries convert into it); `LLMResponse`
//! is what comes back, possibly carrying tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::session::{Role, SessionMessage};

/// A tool advertised to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Human description
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// One message in the request payload.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Image URLs / base64 data URLs for vision-capable models
    pub images: Vec<String>,
    /// Assistant tool calls, as (id, name, json-arguments)
    pub tool_calls: Vec<LLMToolCall>,
    /// For tool messages: the call id being answered
    pub tool_call_id: Option<String>,
    /// For tool messages: the tool name
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// A user message carrying images as a separate list (multi-part form).
    pub fn user_with_images(content: &str, images: Vec<String>) -> Self {
        let mut msg = Self::plain(Role::User, content);
        msg.images = images;
        msg
    }

    /// An assistant message carrying tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        let mut msg = Self::plain(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// A tool-result message.
    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        let mut msg = Self::plain(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg.name = Some(name.to_string());
        msg
    }

    fn plain(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

impl From<&SessionMessage> for ChatMessage {
    fn from(msg: &SessionMessage) -> Self {
        let tool_calls = msg
            .tool_calls
            .as_ref()
            .map(|calls| {
                calls
                    .iter()
                    .map(|c| LLMToolCall {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            role: msg.role,
            content: msg.content.clone(),
            images: Vec::new(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
            name: msg.name.clone(),
        }
    }
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMToolCall {
    /// Call id, echoed back in the tool-result message
    pub id: String,
    /// Tool name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

/// Response from a chat completion request.
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// Text content (the final reply when no tool calls are present)
    pub content: String,
    /// Requested tool calls
    pub tool_calls: Vec<LLMToolCall>,
    /// Usage, when the provider reports it
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// A plain text response.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// Whether the response requests any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Options for a chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Trait implemented by LLM backends.
///
/// The provider translates between nanogrip's message shape and the wire
/// API. Cancellation is cooperative: `cancel` aborts an in-flight request.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request.
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// Model used when no override is given.
    fn default_model(&self) -> &str;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;

    #[test]
    fn test_response_has_tool_calls() {
        let mut resp = LLMResponse::text("hi");
        assert!(!resp.has_tool_calls());
        resp.tool_calls.push(LLMToolCall {
            id: "1".into(),
            name: "shell".into(),
            arguments: "{}".into(),
        });
        assert!(resp.has_tool_calls());
    }

    #[test]
    fn test_chat_options_builder() {
        let opts = ChatOptions::new().with_max_tokens(1000).with_temperature(0.5);
        assert_eq!(opts.max_tokens, Some(1000));
        assert_eq!(opts.temperature, Some(0.5));
    }

    #[test]
    fn test_session_message_conversion() {
        let mut entry = SessionMessage::assistant_with_tools(
            "thinking",
            vec![ToolCall::new("c1", "shell", r#"{"command":"ls"}"#)],
        );
        entry.tool_call_id = None;

        let chat: ChatMessage = (&entry).into();
        assert_eq!(chat.role, Role::Assistant);
        assert_eq!(chat.tool_calls.len(), 1);
        assert_eq!(chat.tool_calls[0].name, "shell");
    }

    #[test]
    fn test_tool_result_message() {
        let msg = ChatMessage::tool_result("c1", "shell", "output");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msg.name.as_deref(), Some("shell"));
    }
}
