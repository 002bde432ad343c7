//! Channel manager — lifecycle and outbound routing
//!
//! Starts every channel enabled in config, registers it by name, and runs
//! the outbound dispatch loop: each outbound message goes to the adapter
//! named by its `channel` field. A message naming an unregistered channel
//! is logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::MessageBus;
use crate::config::Config;
use crate::error::NanoError;

use super::{Channel, DiscordChannel, TelegramChannel, WhatsAppChannel};

/// Manages the set of running channel adapters.
pub struct ChannelManager {
    bus: Arc<MessageBus>,
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Start every enabled polling channel. A channel that fails to start
    /// is logged and skipped; the rest keep going.
    ///
    /// Webhook channels (Slack, DingTalk) are constructed by the gateway,
    /// which owns their HTTP intake, and registered here via [`register`].
    ///
    /// [`register`]: ChannelManager::register
    pub async fn start_all(&self, config: &Config, cancel: &CancellationToken) {
        let mut candidates: Vec<Arc<dyn Channel>> = Vec::new();
        if config.channels.telegram.enabled {
            candidates.push(Arc::new(TelegramChannel::new(
                &config.channels.telegram,
                Arc::clone(&self.bus),
            )));
        }
        if config.channels.whatsapp.enabled {
            candidates.push(Arc::new(WhatsAppChannel::new(
                &config.channels.whatsapp,
                Arc::clone(&self.bus),
            )));
        }
        if config.channels.discord.enabled {
            candidates.push(Arc::new(DiscordChannel::new(
                &config.channels.discord,
                Arc::clone(&self.bus),
            )));
        }

        for channel in candidates {
            let name = channel.name().to_string();
            match channel.start(cancel).await {
                Ok(()) => {
                    self.channels.write().await.insert(name.clone(), channel);
                    info!(channel = %name, "Channel started");
                }
                Err(e) => error!(channel = %name, error = %e, "Failed to start channel"),
            }
        }
    }

    /// Register a channel directly (tests, custom adapters).
    pub async fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        self.channels.write().await.insert(name, channel);
    }

    /// Stop every running channel.
    pub async fn stop_all(&self) {
        let channels = self.channels.read().await;
        for (name, channel) in channels.iter() {
            info!(channel = %name, "Stopping channel");
            if let Err(e) = channel.stop().await {
                warn!(channel = %name, error = %e, "Channel stop failed");
            }
        }
    }

    /// Look up one channel by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Names of running channels.
    pub async fn list(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Consume outbound messages and route each to its adapter until
    /// cancelled. Run this on its own task.
    pub async fn dispatch_outbound(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let msg = match self.bus.consume_outbound(&cancel).await {
                Ok(msg) => msg,
                Err(NanoError::Cancelled) | Err(NanoError::BusClosed) => return,
                Err(e) => {
                    error!(error = %e, "Outbound consume failed");
                    continue;
                }
            };

            let Some(channel) = self.get(&msg.channel).await else {
                warn!(channel = %msg.channel, "No adapter for outbound message, dropping");
                continue;
            };

            if let Err(e) = channel.send(&msg).await {
                error!(channel = %msg.channel, chat_id = %msg.chat_id, error = %e, "Send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::OutboundMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingChannel {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn start(&self, _cancel: &CancellationToken) -> crate::error::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn send(&self, msg: &OutboundMessage) -> crate::error::Result<()> {
            self.sent.lock().unwrap().push(msg.content.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_all_with_nothing_enabled() {
        let bus = Arc::new(MessageBus::new());
        let manager = ChannelManager::new(bus);
        manager
            .start_all(&Config::default(), &CancellationToken::new())
            .await;
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_channel_name() {
        let bus = Arc::new(MessageBus::new());
        let manager = Arc::new(ChannelManager::new(Arc::clone(&bus)));

        let sent = Arc::new(Mutex::new(Vec::new()));
        manager
            .register(Arc::new(RecordingChannel {
                sent: Arc::clone(&sent),
            }))
            .await;

        let cancel = CancellationToken::new();
        let dispatcher = tokio::spawn(Arc::clone(&manager).dispatch_outbound(cancel.clone()));

        bus.publish_outbound(OutboundMessage::new("recorder", "c1", "delivered"))
            .unwrap();
        bus.publish_outbound(OutboundMessage::new("ghost", "c1", "dropped"))
            .unwrap();
        bus.publish_outbound(OutboundMessage::new("recorder", "c1", "also delivered"))
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
        let _ = tokio::time::timeout(std::time::Duration::from_millis(200), dispatcher).await;

        let sent = sent.lock().unwrap();
        assert_eq!(*sent, vec!["delivered", "also delivered"]);
    }

    #[tokio::test]
    async fn test_failed_start_skips_channel() {
        // Telegram enabled but without a token fails to start and is skipped.
        let bus = Arc::new(MessageBus::new());
        let manager = ChannelManager::new(bus);
        let mut config = Config::default();
        config.channels.telegram.enabled = true;

        manager.start_all(&config, &CancellationToken::new()).await;
        assert!(manager.list().await.is_empty());
    }
}
