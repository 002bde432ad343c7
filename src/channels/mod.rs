//! Channel adapters — protocol-specific inbound/outbound
//!
//! Every adapter conforms to the [`Channel`] contract: `name`, `start`,
//! `stop`, `send`. Adapters accept inbound traffic (long-polling, webhook,
//! or persistent connection), apply the per-channel allowlist, and publish
//! into the inbound queue; the [`manager::ChannelManager`] routes outbound
//! messages to the adapter named by each message.

pub mod dingtalk;
pub mod discord;
pub mod manager;
pub mod slack;
pub mod telegram;
pub mod telegram_markdown;
pub mod whatsapp;

pub use dingtalk::DingTalkChannel;
pub use discord::DiscordChannel;
pub use manager::ChannelManager;
pub use slack::SlackChannel;
pub use telegram::TelegramChannel;
pub use whatsapp::WhatsAppChannel;

use async_trait::async_trait;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use crate::bus::OutboundMessage;
use crate::error::Result;

/// Contract every chat channel implements.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name ("telegram", "slack", ...).
    fn name(&self) -> &str;

    /// Start accepting inbound traffic. Returns after spawning any
    /// background polling tasks; `cancel` shuts them down.
    async fn start(&self, cancel: &CancellationToken) -> Result<()>;

    /// Stop the channel and release resources.
    async fn stop(&self) -> Result<()>;

    /// Send one outbound message through this channel.
    async fn send(&self, msg: &OutboundMessage) -> Result<()>;
}

/// Per-channel sender allowlist.
///
/// Entries may be bare ids or `"id|username"` composites. An empty
/// allowlist permits everyone.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    entries: HashSet<String>,
}

impl Allowlist {
    pub fn new(entries: &[String]) -> Self {
        Self {
            entries: entries.iter().cloned().collect(),
        }
    }

    /// Whether `sender_id` (possibly an `"id|username"` composite) is
    /// permitted. Both the composite and the bare id are checked.
    pub fn allows(&self, sender_id: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        if self.entries.contains(sender_id) {
            return true;
        }
        sender_id
            .split('|')
            .next()
            .map(|bare| self.entries.contains(bare))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Backoff state for polling adapters: exponential from 1 s to 30 s on
/// hard errors, a fixed short delay on transient transport errors.
pub(crate) struct PollBackoff {
    delay: std::time::Duration,
}

impl PollBackoff {
    const BASE: std::time::Duration = std::time::Duration::from_secs(1);
    const MAX: std::time::Duration = std::time::Duration::from_secs(30);
    const TRANSIENT: std::time::Duration = std::time::Duration::from_secs(2);

    pub fn new() -> Self {
        Self { delay: Self::BASE }
    }

    /// Delay to sleep after an error. Transient errors (EOF, connection
    /// reset) use a short fixed delay; everything else doubles up to 30 s.
    pub fn on_error(&mut self, error: &str) -> std::time::Duration {
        let transient = error.contains("unexpected EOF")
            || error.contains("connection reset")
            || error.contains("network is unreachable");
        if transient {
            self.delay = Self::TRANSIENT;
        } else {
            self.delay = (self.delay * 2).min(Self::MAX);
        }
        self.delay
    }

    /// Reset after a successful poll.
    pub fn on_success(&mut self) {
        self.delay = Self::BASE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allowlist_allows_everyone() {
        let list = Allowlist::new(&[]);
        assert!(list.allows("anyone"));
        assert!(list.allows("123|bob"));
    }

    #[test]
    fn test_allowlist_composite_and_bare() {
        let list = Allowlist::new(&["123".to_string(), "456|alice".to_string()]);
        assert!(list.allows("123"));
        assert!(list.allows("123|bob")); // bare id matches composite sender
        assert!(list.allows("456|alice"));
        assert!(!list.allows("456")); // composite entry doesn't cover bare id
        assert!(!list.allows("789"));
    }

    #[test]
    fn test_backoff_progression() {
        let mut backoff = PollBackoff::new();
        assert_eq!(backoff.on_error("boom"), std::time::Duration::from_secs(2));
        assert_eq!(backoff.on_error("boom"), std::time::Duration::from_secs(4));
        assert_eq!(backoff.on_error("boom"), std::time::Duration::from_secs(8));
        for _ in 0..5 {
            backoff.on_error("boom");
        }
        assert_eq!(backoff.on_error("boom"), std::time::Duration::from_secs(30));

        backoff.on_success();
        assert_eq!(backoff.on_error("boom"), std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_transient_short_delay() {
        let mut backoff = PollBackoff::new();
        backoff.on_error("x");
        backoff.on_error("x");
        assert_eq!(
            backoff.on_error("unexpected EOF while reading"),
            std::time::Duration::from_secs(2)
        );
    }
}
