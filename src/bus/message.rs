//! Message types for the nanogrip message bus
//!
//! The shared `Message` envelope plus the inbound/outbound wrappers that
//! travel on the two bus queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shared message envelope.
///
/// Carried in full by inbound messages; outbound messages keep only the
/// routing and content fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier assigned by the originating adapter
    pub id: String,
    /// Channel this message came from (e.g. "telegram", "cli", "system")
    pub channel: String,
    /// Sender identifier (may be an "id|username" composite)
    pub sender_id: String,
    /// Chat/conversation identifier within the channel
    pub chat_id: String,
    /// Text content
    pub content: String,
    /// Media references: URLs, base64 data URLs, or local paths
    #[serde(default)]
    pub media: Vec<String>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the message was received
    pub timestamp: DateTime<Utc>,
    /// Optional explicit session key; defaults to "channel:chat_id" routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

/// A message entering the system from a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(flatten)]
    pub message: Message,
}

/// A message leaving the system through a channel adapter.
///
/// An outbound message with an empty `channel` or `chat_id` is discarded
/// with a warning by the bus; it is never auto-routed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Target channel name
    pub channel: String,
    /// Target chat id
    pub chat_id: String,
    /// Text content to send
    pub content: String,
    /// Media to send (URLs or local paths)
    #[serde(default)]
    pub media: Vec<String>,
    /// Free-form metadata (e.g. `from_cron`, `media_type`)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    /// Create an inbound message with the required routing fields.
    ///
    /// # Example
    /// ```
    /// use nanogrip::bus::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello");
    /// assert_eq!(msg.session_key(), "telegram:chat456");
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            message: Message {
                id: String::new(),
                channel: channel.to_string(),
                sender_id: sender_id.to_string(),
                chat_id: chat_id.to_string(),
                content: content.to_string(),
                media: Vec::new(),
                metadata: HashMap::new(),
                timestamp: Utc::now(),
                session_key: None,
            },
        }
    }

    /// Set the stable message id (builder pattern).
    pub fn with_id(mut self, id: &str) -> Self {
        self.message.id = id.to_string();
        self
    }

    /// Attach a media reference (builder pattern).
    pub fn with_media(mut self, media: &str) -> Self {
        self.message.media.push(media.to_string());
        self
    }

    /// Add a metadata entry (builder pattern).
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.message.metadata.insert(key.to_string(), value);
        self
    }

    /// Override the session key (builder pattern).
    pub fn with_session_key(mut self, key: &str) -> Self {
        self.message.session_key = Some(key.to_string());
        self
    }

    /// The session key this message routes to: the explicit key when set,
    /// otherwise `"channel:chat_id"`.
    pub fn session_key(&self) -> String {
        self.message
            .session_key
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.message.channel, self.message.chat_id))
    }
}

impl std::ops::Deref for InboundMessage {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl OutboundMessage {
    /// Create a new outbound message.
    ///
    /// # Example
    /// ```
    /// use nanogrip::bus::OutboundMessage;
    ///
    /// let msg = OutboundMessage::new("telegram", "chat456", "Hello back!");
    /// assert_eq!(msg.channel, "telegram");
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Attach media references (builder pattern).
    pub fn with_media(mut self, media: Vec<String>) -> Self {
        self.media = media;
        self
    }

    /// Add a metadata entry (builder pattern).
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Build a reply addressed back to where an inbound message came from.
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        Self::new(&msg.channel, &msg.chat_id, content)
    }

    /// True when both routing fields are present.
    pub fn is_routable(&self) -> bool {
        !self.channel.is_empty() && !self.chat_id.is_empty()
    }
}
