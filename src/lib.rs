//! nanogrip — personal AI assistant framework
//!
//! Multiplexes inbound messages from chat channels (Telegram, WhatsApp,
//! Discord, Slack, DingTalk, CLI) into a single tool-calling agent loop,
//! with session-scoped history, two-tier long-term memory, a min-heap cron
//! scheduler, and detached background subagents.

pub mod agent;
pub mod bus;
pub mod channels;
pub mod cli;
pub mod config;
pub mod cron;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod providers;
pub mod session;
pub mod skills;
pub mod tools;

pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{NanoError, Result};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition};
pub use session::{Role, Session, SessionManager, SessionMessage, ToolCall};
