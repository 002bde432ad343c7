//! `message` tool — send a message to a chat channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::Result;

use super::types::str_arg;
use super::{Tool, ToolContext};

/// Publishes an outbound message to the bus.
///
/// When the LLM omits `channel`/`chat_id`, the routing defaults to the
/// turn's [`ToolContext`] — the tool replies where the user spoke.
pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to a chat channel. Supports text and media (via URLs or local paths)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Message content to send",
                },
                "channel": {
                    "type": "string",
                    "description": "Channel name (telegram, whatsapp, discord, etc.). \
                                    Defaults to the current conversation's channel.",
                },
                "chat_id": {
                    "type": "string",
                    "description": "Chat ID to send to. Defaults to the current conversation.",
                },
                "media": {
                    "type": "string",
                    "description": "Media URL or local file path to send. For multiple, \
                                    separate with commas.",
                },
                "media_type": {
                    "type": "string",
                    "description": "Media type: photo, document, audio, video. Default: photo",
                },
            },
            "required": ["content"],
        })
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<String> {
        let content = str_arg(&args, "content").unwrap_or_default();

        let channel = str_arg(&args, "channel")
            .map(String::from)
            .or_else(|| ctx.channel.clone())
            .unwrap_or_default();
        let chat_id = str_arg(&args, "chat_id")
            .map(String::from)
            .or_else(|| ctx.chat_id.clone())
            .unwrap_or_default();

        if channel.is_empty() || chat_id.is_empty() {
            return Ok("Error: no target channel/chat_id (none given, none in context)".to_string());
        }

        let media: Vec<String> = str_arg(&args, "media")
            .map(|m| m.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        let mut msg = OutboundMessage::new(&channel, &chat_id, content).with_media(media);
        if let Some(media_type) = str_arg(&args, "media_type") {
            msg = msg.with_metadata("media_type", json!(media_type));
        }

        match self.bus.publish_outbound(msg) {
            Ok(()) => Ok("Message sent".to_string()),
            Err(e) => Ok(format!("Error sending message: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_message_uses_context_routing() {
        let bus = Arc::new(MessageBus::new());
        let tool = MessageTool::new(Arc::clone(&bus));
        let ctx = ToolContext::new().with_channel("telegram", "chat99");

        let result = tool
            .execute(&cancel(), json!({"content": "hi there"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result, "Message sent");

        let sent = bus.consume_outbound(&cancel()).await.unwrap();
        assert_eq!(sent.channel, "telegram");
        assert_eq!(sent.chat_id, "chat99");
        assert_eq!(sent.content, "hi there");
    }

    #[tokio::test]
    async fn test_message_explicit_routing_wins() {
        let bus = Arc::new(MessageBus::new());
        let tool = MessageTool::new(Arc::clone(&bus));
        let ctx = ToolContext::new().with_channel("telegram", "chat99");

        tool.execute(
            &cancel(),
            json!({"content": "x", "channel": "discord", "chat_id": "42"}),
            &ctx,
        )
        .await
        .unwrap();

        let sent = bus.consume_outbound(&cancel()).await.unwrap();
        assert_eq!(sent.channel, "discord");
        assert_eq!(sent.chat_id, "42");
    }

    #[tokio::test]
    async fn test_message_no_routing_is_error_text() {
        let bus = Arc::new(MessageBus::new());
        let tool = MessageTool::new(bus);

        let result = tool
            .execute(&cancel(), json!({"content": "orphan"}), &ToolContext::new())
            .await
            .unwrap();
        assert!(result.starts_with("Error: no target channel"));
    }

    #[tokio::test]
    async fn test_message_media_split() {
        let bus = Arc::new(MessageBus::new());
        let tool = MessageTool::new(Arc::clone(&bus));
        let ctx = ToolContext::new().with_channel("telegram", "1");

        tool.execute(
            &cancel(),
            json!({"content": "pics", "media": "/a.png, /b.png", "media_type": "photo"}),
            &ctx,
        )
        .await
        .unwrap();

        let sent = bus.consume_outbound(&cancel()).await.unwrap();
        assert_eq!(sent.media, vec!["/a.png", "/b.png"]);
        assert_eq!(sent.metadata.get("media_type"), Some(&json!("photo")));
    }
}
