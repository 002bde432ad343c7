//! Telegram channel adapter
//!
//! Long-polls `getUpdates` for inbound messages and sends through the Bot
//! API. Inbound photos and documents are downloaded and inlined as base64
//! data URLs so the agent needs no Telegram credentials. Outbound text is
//! converted from Markdown to Telegram HTML and split at safe boundaries;
//! local-path media uploads via multipart.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::TelegramConfig;
use crate::error::{NanoError, Result};

use super::telegram_markdown::{markdown_to_html, split_message};
use super::{Allowlist, Channel, PollBackoff};

/// Telegram caps messages at 4096 chars; stay under it.
const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    from: Option<TgUser>,
    chat: TgChat,
    #[serde(default)]
    photo: Vec<TgPhotoSize>,
    #[serde(default)]
    document: Option<TgDocument>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgPhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TgDocument {
    file_id: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Telegram bot adapter.
pub struct TelegramChannel {
    token: String,
    allowlist: Allowlist,
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    update_id: Arc<AtomicI64>,
    running: Arc<AtomicBool>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, bus: Arc<MessageBus>) -> Self {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(90));
        if !config.proxy.is_empty() {
            let mut proxy_url = config.proxy.clone();
            if !proxy_url.contains("://") {
                proxy_url = format!("http://{}", proxy_url);
            }
            match reqwest::Proxy::all(&proxy_url) {
                Ok(proxy) => {
                    info!(proxy = %proxy_url, "Telegram channel using proxy");
                    builder = builder.proxy(proxy);
                }
                Err(e) => warn!(error = %e, "Invalid Telegram proxy, ignoring"),
            }
        }

        Self {
            token: config.token.clone(),
            allowlist: Allowlist::new(&config.allow_from),
            bus,
            client: builder.build().unwrap_or_default(),
            update_id: Arc::new(AtomicI64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn poller(&self) -> Arc<Self> {
        Arc::new(Self {
            token: self.token.clone(),
            allowlist: self.allowlist.clone(),
            bus: Arc::clone(&self.bus),
            client: self.client.clone(),
            update_id: Arc::clone(&self.update_id),
            running: Arc::clone(&self.running),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    async fn poll_updates(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = PollBackoff::new();

        while self.running.load(Ordering::SeqCst) && !cancel.is_cancelled() {
            match self.get_updates().await {
                Ok(updates) => {
                    backoff.on_success();
                    for update in updates {
                        if update.update_id >= self.update_id.load(Ordering::SeqCst) {
                            self.update_id.store(update.update_id + 1, Ordering::SeqCst);
                            if let Some(message) = update.message {
                                self.handle_message(message, update.update_id).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    let delay = backoff.on_error(&e.to_string());
                    warn!(error = %e, retry_in = ?delay, "Telegram polling error");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn get_updates(&self) -> Result<Vec<Update>> {
        let mut request = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[("timeout", "60")]);
        let offset = self.update_id.load(Ordering::SeqCst);
        if offset > 0 {
            request = request.query(&[("offset", offset.to_string())]);
        }

        let response = request.send().await?;

        #[derive(Deserialize)]
        struct UpdatesResponse {
            ok: bool,
            #[serde(default)]
            result: Vec<Update>,
        }

        let body: UpdatesResponse = response.json().await?;
        if !body.ok {
            return Err(NanoError::Channel("Telegram API returned not-ok".into()));
        }
        Ok(body.result)
    }

    async fn handle_message(&self, msg: TgMessage, update_id: i64) {
        let has_text = msg.text.is_some() || msg.caption.is_some();
        let has_media = !msg.photo.is_empty() || msg.document.is_some();
        if !has_text && !has_media {
            return;
        }

        let Some(from) = &msg.from else { return };
        let sender_id = match &from.username {
            Some(username) => format!("{}|{}", from.id, username),
            None => from.id.to_string(),
        };

        if !self.allowlist.allows(&sender_id) {
            debug!(sender = %sender_id, "Ignoring message from unauthorized user");
            return;
        }

        let content = msg.text.or(msg.caption).unwrap_or_default();
        let chat_id = msg.chat.id.to_string();

        let mut inbound = InboundMessage::new("telegram", &sender_id, &chat_id, &content)
            .with_id(&update_id.to_string());

        // Highest-resolution photo is the last size entry.
        if let Some(photo) = msg.photo.last() {
            match self.download_as_data_url(&photo.file_id, "image/jpeg").await {
                Ok(data_url) => inbound = inbound.with_media(&data_url),
                Err(e) => warn!(error = %e, "Failed to download photo"),
            }
        }
        if let Some(doc) = &msg.document {
            let mime = doc.mime_type.as_deref().unwrap_or("application/octet-stream");
            match self.download_as_data_url(&doc.file_id, mime).await {
                Ok(data_url) => inbound = inbound.with_media(&data_url),
                Err(e) => warn!(error = %e, "Failed to download document"),
            }
        }

        // Non-blocking publish: a full queue drops the message with a log.
        if let Err(e) = self.bus.publish_inbound(inbound) {
            warn!(error = %e, "Dropping inbound Telegram message");
        }
    }

    async fn download_as_data_url(&self, file_id: &str, mime: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct FileResponse {
            ok: bool,
            result: Option<FileInfo>,
        }
        #[derive(Deserialize)]
        struct FileInfo {
            file_path: Option<String>,
        }

        let response: FileResponse = self
            .client
            .get(self.api_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?
            .json()
            .await?;

        let path = response
            .result
            .filter(|_| response.ok)
            .and_then(|f| f.file_path)
            .ok_or_else(|| NanoError::Channel("getFile returned no path".into()))?;

        let url = format!("https://api.telegram.org/file/bot{}/{}", self.token, path);
        let bytes = self.client.get(&url).send().await?.bytes().await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(format!("data:{};base64,{}", mime, encoded))
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NanoError::Channel(format!(
                "Telegram API error: {} {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn send_media(&self, chat_id: i64, media: &str, caption: &str) -> Result<()> {
        if media.starts_with("http://") || media.starts_with("https://") {
            return self.send_photo_by_url(chat_id, media, caption).await;
        }
        self.send_photo_by_file(chat_id, media, caption).await
    }

    async fn send_photo_by_url(&self, chat_id: i64, url: &str, caption: &str) -> Result<()> {
        let mut body = json!({ "chat_id": chat_id, "photo": url });
        if !caption.is_empty() {
            body["caption"] = json!(markdown_to_html(caption));
            body["parse_mode"] = json!("HTML");
        }

        let response = self
            .client
            .post(self.api_url("sendPhoto"))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NanoError::Channel(format!(
                "Telegram API error: {} {}",
                status, text
            )));
        }
        Ok(())
    }

    async fn send_photo_by_file(&self, chat_id: i64, path: &str, caption: &str) -> Result<()> {
        let expanded = crate::config::expand_tilde(path);
        let bytes = tokio::fs::read(&expanded).await?;
        let filename = expanded
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            );
        if !caption.is_empty() {
            form = form
                .text("caption", markdown_to_html(caption))
                .text("parse_mode", "HTML");
        }

        let response = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NanoError::Channel(format!(
                "Telegram API error: {} {}",
                status, text
            )));
        }
        debug!(path = %path, "Sent photo");
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        if self.token.is_empty() {
            return Err(NanoError::Config("Telegram bot token not configured".into()));
        }
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(self.poller().poll_updates(cancel.clone()));

        info!("Telegram channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        info!("Telegram channel stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let chat_id: i64 = msg
            .chat_id
            .parse()
            .map_err(|_| NanoError::Channel(format!("invalid chat_id: {}", msg.chat_id)))?;

        if !msg.media.is_empty() {
            for media in &msg.media {
                self.send_media(chat_id, media, &msg.content).await?;
            }
            return Ok(());
        }

        let html = markdown_to_html(&msg.content);
        for part in split_message(&html, MAX_MESSAGE_LEN) {
            self.send_text(chat_id, &part).await?;
        }
        Ok(())
    }
}
