//! Session types for nanogrip
//!
//! A session is the append-only log of one conversation, keyed by
//! `"channel:chat_id"`. Entries carry the role/content pairs sent to the
//! LLM plus tool-call structure for assistant and tool entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// "user", "assistant", "system", or "tool"
    pub role: Role,
    /// Text content
    pub content: String,
    /// RFC3339 timestamp of when the entry was appended
    pub timestamp: String,
    /// Tool calls issued by an assistant entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool entries: the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool entries: the tool name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SessionMessage {
    /// Create a user entry.
    pub fn user(content: &str) -> Self {
        Self::plain(Role::User, content)
    }

    /// Create an assistant entry.
    pub fn assistant(content: &str) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create a system entry.
    pub fn system(content: &str) -> Self {
        Self::plain(Role::System, content)
    }

    /// Create an assistant entry carrying tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::plain(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create a tool-result entry.
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
            timestamp: Utc::now().to_rfc3339(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Whether this assistant entry carries at least one tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map(|t| !t.is_empty()).unwrap_or(false)
    }
}

/// Role of a conversation entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool call recorded on an assistant entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier assigned by the LLM
    pub id: String,
    /// Tool name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// One conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique key ("channel:chat_id" or explicit)
    pub key: String,
    /// Ordered append-only entries
    pub messages: Vec<SessionMessage>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Arbitrary metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Index into `messages` up to which memory consolidation has run
    #[serde(default)]
    pub last_consolidated: usize,
}

impl Session {
    /// Create a new empty session.
    pub fn new(key: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            last_consolidated: 0,
        }
    }

    /// Append an entry and bump `updated_at`.
    pub fn add_message(&mut self, message: SessionMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// The most recent `max` entries, oldest first.
    pub fn history(&self, max: usize) -> &[SessionMessage] {
        let start = self.messages.len().saturating_sub(max);
        &self.messages[start..]
    }

    /// Number of entries.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Whether the session has no entries.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
