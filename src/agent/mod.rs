//! Agent module — core reasoning and orchestration
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │             │
//! └─────────────┘     └──────┬──────┘     └─────────────┘
//!                            │
//!              ┌─────────────┼─────────────┐
//!              ▼             ▼             ▼
//!       ┌────────────┐ ┌───────────┐ ┌────────────┐
//!       │  Sessions  │ │   Tools   │ │  Subagents │
//!       └────────────┘ └───────────┘ └────────────┘
//! ```
//!
//! The [`AgentLoop`] consumes inbound messages, builds context via the
//! [`ContextBuilder`], iterates LLM calls and tool executions up to a hard
//! cap, and emits the final reply outbound. The [`SubagentManager`] runs
//! reduced copies of the loop as detached background tasks.

mod context;
mod r#loop;
mod subagent;

pub use context::ContextBuilder;
pub use r#loop::AgentLoop;
pub use subagent::SubagentManager;
