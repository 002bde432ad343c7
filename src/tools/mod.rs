//! Tools module — the callable surface exposed to the LLM
//!
//! The [`Tool`] trait defines a callable (name, description, JSON-Schema
//! parameters, validation, async executor); the [`ToolRegistry`] indexes
//! tools by name and turns every outcome into text for the transcript.
//!
//! Concrete tools: `shell`, `filesystem`, `web_search`, `message`, `spawn`,
//! `cron`, `todo`, and `save_memory`.

pub mod cron;
pub mod filesystem;
pub mod memory;
pub mod message;
mod registry;
pub mod shell;
pub mod spawn;
pub mod todo;
mod types;
pub mod web;

pub use cron::CronTool;
pub use filesystem::FilesystemTool;
pub use memory::SaveMemoryTool;
pub use message::MessageTool;
pub use registry::ToolRegistry;
pub use shell::ShellTool;
pub use spawn::{SpawnFn, SpawnTool};
pub use todo::TodoTool;
pub use types::{Tool, ToolContext};
pub use web::WebSearchTool;
