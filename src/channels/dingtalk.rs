//! DingTalk channel adapter
//!
//! Sends through the robot API; inbound arrives through the gateway's
//! webhook endpoint with timestamp + HMAC-SHA256 signature verification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::DingTalkConfig;
use crate::error::{NanoError, Result};

use super::{Allowlist, Channel};

type HmacSha256 = Hmac<Sha256>;

/// DingTalk robot adapter.
pub struct DingTalkChannel {
    client_id: String,
    client_secret: String,
    allowlist: Allowlist,
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    running: AtomicBool,
}

impl DingTalkChannel {
    pub fn new(config: &DingTalkConfig, bus: Arc<MessageBus>) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            allowlist: Allowlist::new(&config.allow_from),
            bus,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            running: AtomicBool::new(false),
        }
    }

    /// Verify the `timestamp` + `sign` pair DingTalk attaches to webhook
    /// callbacks: base64(HMAC-SHA256(secret, "timestamp\nsecret")).
    pub fn verify_signature(&self, timestamp: &str, signature: &str) -> bool {
        if self.client_secret.is_empty() {
            return true;
        }
        let payload = format!("{}\n{}", timestamp, self.client_secret);
        let Ok(mut mac) = HmacSha256::new_from_slice(self.client_secret.as_bytes()) else {
            return false;
        };
        mac.update(payload.as_bytes());
        let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        expected == signature
    }

    /// Handle a webhook callback payload delivered by the gateway.
    pub fn handle_event(&self, payload: &Value) {
        let sender = payload
            .get("senderStaffId")
            .or_else(|| payload.get("senderId"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let conversation = payload
            .get("conversationId")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let text = payload
            .pointer("/text/content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();

        if sender.is_empty() || conversation.is_empty() || text.is_empty() {
            return;
        }
        if !self.allowlist.allows(sender) {
            debug!(sender = %sender, "Ignoring DingTalk event from unauthorized user");
            return;
        }

        let mut inbound = InboundMessage::new("dingtalk", sender, conversation, text);
        if let Some(webhook) = payload.get("sessionWebhook").and_then(|v| v.as_str()) {
            inbound = inbound.with_metadata("session_webhook", json!(webhook));
        }

        if let Err(e) = self.bus.publish_inbound(inbound) {
            warn!(error = %e, "Dropping inbound DingTalk message");
        }
    }
}

#[async_trait]
impl Channel for DingTalkChannel {
    fn name(&self) -> &str {
        "dingtalk"
    }

    async fn start(&self, _cancel: &CancellationToken) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(NanoError::Config("DingTalk client id not configured".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        info!("DingTalk channel started (webhook inbound via gateway)");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("DingTalk channel stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        // Replies go to the conversation's session webhook when one was
        // captured inbound; otherwise the global robot endpoint.
        let url = msg
            .metadata
            .get("session_webhook")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| {
                format!(
                    "https://oapi.dingtalk.com/robot/send?access_token={}",
                    self.client_id
                )
            });

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "msgtype": "text",
                "text": { "content": msg.content },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NanoError::Channel(format!(
                "DingTalk API error: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
