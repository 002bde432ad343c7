//! Slack channel adapter
//!
//! Sends via `chat.postMessage` (optionally in the originating thread).
//! Inbound arrives through the gateway's webhook endpoint: the gateway
//! answers `url_verification` challenges itself and hands `event_callback`
//! payloads to [`SlackChannel::handle_event`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::SlackConfig;
use crate::error::{NanoError, Result};

use super::{Allowlist, Channel};

/// Slack bot adapter.
pub struct SlackChannel {
    bot_token: String,
    reply_in_thread: bool,
    allowlist: Allowlist,
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    running: AtomicBool,
}

impl SlackChannel {
    pub fn new(config: &SlackConfig, bus: Arc<MessageBus>) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            reply_in_thread: config.reply_in_thread,
            allowlist: Allowlist::new(&config.allow_from),
            bus,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            running: AtomicBool::new(false),
        }
    }

    /// Handle an `event_callback` payload delivered by the gateway webhook.
    ///
    /// Only `message` and `app_mention` events produce inbound messages;
    /// bot echoes (payloads carrying `bot_id`) are ignored.
    pub fn handle_event(&self, payload: &Value) {
        let Some(event) = payload.get("event") else {
            return;
        };
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
        if !matches!(event_type, "message" | "app_mention") {
            return;
        }
        if event.get("bot_id").is_some() {
            return;
        }

        let user = event.get("user").and_then(|u| u.as_str()).unwrap_or("");
        let channel = event.get("channel").and_then(|c| c.as_str()).unwrap_or("");
        let text = event.get("text").and_then(|t| t.as_str()).unwrap_or("");
        if user.is_empty() || channel.is_empty() || text.is_empty() {
            return;
        }

        if !self.allowlist.allows(user) {
            debug!(user = %user, "Ignoring Slack event from unauthorized user");
            return;
        }

        let mut inbound = InboundMessage::new("slack", user, channel, text);
        if let Some(ts) = event.get("ts").and_then(|t| t.as_str()) {
            inbound = inbound.with_metadata("thread_ts", json!(ts));
        }

        if let Err(e) = self.bus.publish_inbound(inbound) {
            warn!(error = %e, "Dropping inbound Slack event");
        }
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn start(&self, _cancel: &CancellationToken) -> Result<()> {
        if self.bot_token.is_empty() {
            return Err(NanoError::Config("Slack bot token not configured".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        info!("Slack channel started (webhook inbound via gateway)");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Slack channel stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let mut body = json!({
            "channel": msg.chat_id,
            "text": msg.content,
        });
        if self.reply_in_thread {
            if let Some(ts) = msg.metadata.get("thread_ts").and_then(|t| t.as_str()) {
                body["thread_ts"] = json!(ts);
            }
        }

        let response = self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        let result: Value = response.json().await?;
        if !result.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let error = result
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            return Err(NanoError::Channel(format!("Slack API error: {}", error)));
        }
        Ok(())
    }
}
