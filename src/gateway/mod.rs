//! Gateway HTTP surface
//!
//! A minimal HTTP/1.1 server over a raw `TcpListener` — no web framework,
//! keeping the binary footprint small. Endpoints:
//!
//! - `GET /healthz` — liveness probe
//! - `POST <slack webhookPath>` — Slack Events API intake
//!   (`url_verification` challenges are answered directly)
//! - `POST /webhook/dingtalk` — DingTalk robot callbacks with
//!   timestamp + signature verification

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channels::{DingTalkChannel, SlackChannel};
use crate::error::{NanoError, Result};

/// Cap on accepted request bodies.
const MAX_BODY: usize = 1 << 20;

/// The gateway's webhook intake server.
pub struct GatewayServer {
    host: String,
    port: u16,
    slack: Option<(String, Arc<SlackChannel>)>,
    dingtalk: Option<Arc<DingTalkChannel>>,
}

impl GatewayServer {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            slack: None,
            dingtalk: None,
        }
    }

    /// Attach the Slack channel at its configured webhook path.
    pub fn with_slack(mut self, path: &str, channel: Arc<SlackChannel>) -> Self {
        let path = if path.is_empty() { "/webhook/slack" } else { path };
        self.slack = Some((path.to_string(), channel));
        self
    }

    /// Attach the DingTalk channel at `/webhook/dingtalk`.
    pub fn with_dingtalk(mut self, channel: Arc<DingTalkChannel>) -> Self {
        self.dingtalk = Some(channel);
        self
    }

    /// Bind and serve until cancelled. Returns after spawning the accept
    /// loop.
    pub async fn start(self, cancel: &CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| NanoError::Config(format!("gateway bind {} failed: {}", addr, e)))?;
        info!(addr = %addr, "Gateway listening");

        let server = Arc::new(self);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let (stream, peer) = tokio::select! {
                    _ = cancel.cancelled() => return,
                    accepted = listener.accept() => match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "Gateway accept failed");
                            continue;
                        }
                    },
                };
                debug!(peer = %peer, "Gateway connection");
                let server = Arc::clone(&server);
                tokio::spawn(async move {
                    if let Err(e) = server.handle_connection(stream).await {
                        debug!(error = %e, "Gateway connection error");
                    }
                });
            }
        });
        Ok(())
    }

    async fn handle_connection(&self, mut stream: tokio::net::TcpStream) -> Result<()> {
        let mut buf = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];

        // Read until end of headers, then the declared body length.
        let header_end = loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find_header_end(&buf) {
                break pos;
            }
            if buf.len() > MAX_BODY {
                respond(&mut stream, 413, "payload too large").await?;
                return Ok(());
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = content_length(&head);
        let body_start = header_end + 4;
        while buf.len() < body_start + content_length {
            if buf.len() > MAX_BODY + body_start {
                respond(&mut stream, 413, "payload too large").await?;
                return Ok(());
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = &buf[body_start..(body_start + content_length).min(buf.len())];

        let mut lines = head.lines();
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };

        match (method, path) {
            ("GET", "/healthz") => {
                respond_json(&mut stream, 200, r#"{"status":"ok"}"#).await?;
            }
            ("POST", path) if self.slack.as_ref().map(|(p, _)| p == path).unwrap_or(false) => {
                let (_, slack) = self.slack.as_ref().expect("checked above");
                self.handle_slack(&mut stream, slack, body).await?;
            }
            ("POST", "/webhook/dingtalk") if self.dingtalk.is_some() => {
                let dingtalk = self.dingtalk.as_ref().expect("checked above");
                self.handle_dingtalk(&mut stream, dingtalk, query, body).await?;
            }
            _ => {
                respond(&mut stream, 404, "not found").await?;
            }
        }
        Ok(())
    }

    async fn handle_slack(
        &self,
        stream: &mut tokio::net::TcpStream,
        slack: &Arc<SlackChannel>,
        body: &[u8],
    ) -> Result<()> {
        let payload: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => {
                respond(stream, 400, "bad request").await?;
                return Ok(());
            }
        };

        // The Events API handshake echoes the challenge back.
        if payload.get("type").and_then(|t| t.as_str()) == Some("url_verification") {
            let challenge = payload
                .get("challenge")
                .and_then(|c| c.as_str())
                .unwrap_or_default();
            respond_json(stream, 200, &format!(r#"{{"challenge":"{}"}}"#, challenge)).await?;
            return Ok(());
        }

        slack.handle_event(&payload);
        respond(stream, 200, "ok").await?;
        Ok(())
    }

    async fn handle_dingtalk(
        &self,
        stream: &mut tokio::net::TcpStream,
        dingtalk: &Arc<DingTalkChannel>,
        query: &str,
        body: &[u8],
    ) -> Result<()> {
        let timestamp = query_param(query, "timestamp").unwrap_or_default();
        let sign = query_param(query, "sign").unwrap_or_default();
        if !dingtalk.verify_signature(&timestamp, &sign) {
            warn!("DingTalk webhook signature verification failed");
            respond(stream, 401, "unauthorized").await?;
            return Ok(());
        }

        let payload: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => {
                respond(stream, 400, "bad request").await?;
                return Ok(());
            }
        };
        dingtalk.handle_event(&payload);
        respond(stream, 200, "ok").await?;
        Ok(())
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == name {
            Some(urldecode(v))
        } else {
            None
        }
    })
}

fn urldecode(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if let Some(hex) = s.get(i + 1..i + 3) {
                    if let Ok(byte) = u8::from_str_radix(hex, 16) {
                        out.push(byte);
                        i += 3;
                        continue;
                    }
                }
                out.push(b'%');
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

async fn respond(stream: &mut tokio::net::TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "text/plain", body).await
}

async fn respond_json(stream: &mut tokio::net::TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body).await
}

async fn write_response(
    stream: &mut tokio::net::TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) -> Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        413 => "Payload Too Large",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        content_type,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
