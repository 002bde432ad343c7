//! Discord channel adapter
//!
//! Sends through the REST API (`POST /channels/{id}/messages`). Inbound
//! delivery requires a Gateway websocket session, which this adapter does
//! not maintain — `start` resolves the gateway URL and logs the limitation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{MessageBus, OutboundMessage};
use crate::config::DiscordConfig;
use crate::error::{NanoError, Result};

use super::{Allowlist, Channel};

const API_BASE: &str = "https://discord.com/api/v10";
/// Discord caps messages at 2000 chars.
const MAX_MESSAGE_LEN: usize = 2000;

/// Discord bot adapter (REST send only).
pub struct DiscordChannel {
    token: String,
    #[allow(dead_code)]
    allowlist: Allowlist,
    #[allow(dead_code)]
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    running: AtomicBool,
}

impl DiscordChannel {
    pub fn new(config: &DiscordConfig, bus: Arc<MessageBus>) -> Self {
        Self {
            token: config.token.clone(),
            allowlist: Allowlist::new(&config.allow_from),
            bus,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            running: AtomicBool::new(false),
        }
    }

    async fn fetch_gateway_url(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct Gateway {
            url: String,
        }

        let response = self
            .client
            .get(format!("{}/gateway/bot", API_BASE))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NanoError::Channel(format!(
                "gateway lookup failed with status {}",
                response.status()
            )));
        }
        let gateway: Gateway = response.json().await?;
        Ok(gateway.url)
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self, _cancel: &CancellationToken) -> Result<()> {
        if self.token.is_empty() {
            return Err(NanoError::Config("Discord bot token not configured".into()));
        }
        self.running.store(true, Ordering::SeqCst);

        match self.fetch_gateway_url().await {
            Ok(url) => {
                // Inbound events need a Gateway websocket session; outbound
                // REST sends work without one.
                warn!(gateway = %url, "Discord inbound requires a Gateway connection (not maintained); send-only");
            }
            Err(e) => warn!(error = %e, "Discord gateway lookup failed; send-only"),
        }

        info!("Discord channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Discord channel stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let url = format!("{}/channels/{}/messages", API_BASE, msg.chat_id);

        for part in super::telegram_markdown::split_message(&msg.content, MAX_MESSAGE_LEN) {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .json(&json!({ "content": part }))
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(NanoError::Channel(format!(
                    "Discord API error: {} {}",
                    status, body
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_requires_token() {
        let ch = DiscordChannel::new(&DiscordConfig::default(), Arc::new(MessageBus::new()));
        let result = ch.start(&CancellationToken::new()).await;
        assert!(matches!(result, Err(NanoError::Config(_))));
    }

    #[test]
    fn test_name() {
        let ch = DiscordChannel::new(&DiscordConfig::default(), Arc::new(MessageBus::new()));
        assert_eq!(ch.name(), "discord");
    }
}
