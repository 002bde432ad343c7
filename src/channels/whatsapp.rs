//! WhatsApp bridge channel adapter
//!
//! Talks to a bridge service over REST: `GET {bridge}/messages` polling for
//! inbound, `POST {bridge}/send` for outbound, both with an optional bearer
//! token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::WhatsAppConfig;
use crate::error::{NanoError, Result};

use super::{Allowlist, Channel, PollBackoff};

#[derive(Debug, Deserialize)]
struct BridgeMessage {
    #[serde(default)]
    id: String,
    sender: String,
    chat_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    media: Vec<String>,
}

/// WhatsApp adapter backed by a bridge service.
pub struct WhatsAppChannel {
    bridge_url: String,
    bridge_token: String,
    allowlist: Allowlist,
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    running: Arc<AtomicBool>,
}

impl WhatsAppChannel {
    pub fn new(config: &WhatsAppConfig, bus: Arc<MessageBus>) -> Self {
        Self {
            bridge_url: config.bridge_url.trim_end_matches('/').to_string(),
            bridge_token: config.bridge_token.clone(),
            allowlist: Allowlist::new(&config.allow_from),
            bus,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.bridge_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.bridge_token)
        }
    }

    fn poller(&self) -> Arc<Self> {
        Arc::new(Self {
            bridge_url: self.bridge_url.clone(),
            bridge_token: self.bridge_token.clone(),
            allowlist: self.allowlist.clone(),
            bus: Arc::clone(&self.bus),
            client: self.client.clone(),
            running: Arc::clone(&self.running),
        })
    }

    async fn poll_messages(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = PollBackoff::new();

        while self.running.load(Ordering::SeqCst) && !cancel.is_cancelled() {
            match self.fetch_messages().await {
                Ok(messages) => {
                    backoff.on_success();
                    for msg in messages {
                        self.handle_message(msg);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                    }
                }
                Err(e) => {
                    let delay = backoff.on_error(&e.to_string());
                    warn!(error = %e, retry_in = ?delay, "WhatsApp polling error");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn fetch_messages(&self) -> Result<Vec<BridgeMessage>> {
        let response = self
            .authorized(self.client.get(format!("{}/messages", self.bridge_url)))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NanoError::Channel(format!(
                "bridge returned status {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    fn handle_message(&self, msg: BridgeMessage) {
        if !self.allowlist.allows(&msg.sender) {
            debug!(sender = %msg.sender, "Ignoring message from unauthorized user");
            return;
        }

        let mut inbound =
            InboundMessage::new("whatsapp", &msg.sender, &msg.chat_id, &msg.content)
                .with_id(&msg.id);
        for media in msg.media {
            inbound = inbound.with_media(&media);
        }

        if let Err(e) = self.bus.publish_inbound(inbound) {
            warn!(error = %e, "Dropping inbound WhatsApp message");
        }
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        if self.bridge_url.is_empty() {
            return Err(NanoError::Config("WhatsApp bridge URL not configured".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(self.poller().poll_messages(cancel.clone()));
        info!("WhatsApp channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("WhatsApp channel stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let response = self
            .authorized(self.client.post(format!("{}/send", self.bridge_url)))
            .json(&json!({
                "chat_id": msg.chat_id,
                "content": msg.content,
                "media": msg.media,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NanoError::Channel(format!(
                "bridge send failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allow_from: &[String]) -> WhatsAppChannel {
        let config = WhatsAppConfig {
            enabled: true,
            bridge_url: "http://localhost:9999/".to_string(),
            bridge_token: "secret".to_string(),
            allow_from: allow_from.to_vec(),
        };
        WhatsAppChannel::new(&config, Arc::new(MessageBus::new()))
    }

    #[test]
    fn test_bridge_url_trailing_slash_trimmed() {
        let ch = channel(&[]);
        assert_eq!(ch.bridge_url, "http://localhost:9999");
    }

    #[tokio::test]
    async fn test_start_requires_bridge_url() {
        let ch = WhatsAppChannel::new(&WhatsAppConfig::default(), Arc::new(MessageBus::new()));
        let result = ch.start(&CancellationToken::new()).await;
        assert!(matches!(result, Err(NanoError::Config(_))));
    }

    #[tokio::test]
    async fn test_handle_message_allowlist_and_publish() {
        let ch = channel(&["+4912345".to_string()]);

        ch.handle_message(BridgeMessage {
            id: "m1".into(),
            sender: "+19999".into(),
            chat_id: "group1".into(),
            content: "blocked".into(),
            media: vec![],
        });
        assert_eq!(ch.bus.inbound_size(), 0);

        ch.handle_message(BridgeMessage {
            id: "m2".into(),
            sender: "+4912345".into(),
            chat_id: "group1".into(),
            content: "hello".into(),
            media: vec!["data:image/png;base64,AA".into()],
        });
        assert_eq!(ch.bus.inbound_size(), 1);

        let cancel = CancellationToken::new();
        let msg = ch.bus.consume_inbound(&cancel).await.unwrap();
        assert_eq!(msg.channel, "whatsapp");
        assert_eq!(msg.media.len(), 1);
        assert_eq!(msg.session_key(), "whatsapp:group1");
    }
}
