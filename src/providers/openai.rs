//! OpenAI-compatible chat completions provider
//!
//! One HTTP implementation serves every provider that speaks the
//! `chat/completions` dialect (OpenAI, OpenRouter, DeepSeek, Groq, and the
//! other registry entries). The API base resolves from config, then from
//! the provider spec matched against the model name, then the OpenAI
//! default.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{NanoError, Result};
use crate::session::Role;

use super::registry::find_by_model;
use super::types::{
    ChatMessage, ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage,
};

/// Ceiling on a single LLM HTTP call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat-completions provider for OpenAI-compatible endpoints.
pub struct OpenAiCompatProvider {
    api_key: String,
    api_base: Option<String>,
    default_model: String,
    extra_headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider.
    ///
    /// # Arguments
    /// * `api_key` - bearer token
    /// * `api_base` - endpoint override; `None` resolves from the model name
    /// * `default_model` - model used when a call passes no override
    /// * `extra_headers` - additional headers on every request
    pub fn new(
        api_key: &str,
        api_base: Option<String>,
        default_model: &str,
        extra_headers: HashMap<String, String>,
    ) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base,
            default_model: default_model.to_string(),
            extra_headers,
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    fn resolve_url(&self, model: &str) -> String {
        let mut base = self.api_base.clone().unwrap_or_default();
        if base.is_empty() {
            if let Some(spec) = find_by_model(model) {
                if spec.is_gateway && !spec.default_api_base.is_empty() {
                    base = spec.default_api_base.to_string();
                }
            }
        }
        if base.is_empty() {
            base = "https://api.openai.com/v1".to_string();
        }
        if base.contains("chat/completions") {
            return base;
        }
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    /// Strip the registry prefix when the endpoint is explicit; keep the
    /// LiteLLM-style prefixed name for gateways that understand it.
    fn resolve_model<'a>(&self, model: &'a str) -> &'a str {
        if self.api_base.is_none() {
            return model;
        }
        match find_by_model(model) {
            Some(spec) if !spec.is_gateway && !spec.prefix.is_empty() => {
                model.strip_prefix(spec.prefix).unwrap_or(model)
            }
            _ => model,
        }
    }

    fn serialize_message(msg: &ChatMessage) -> Value {
        let mut out = json!({ "role": msg.role.to_string() });

        if msg.images.is_empty() {
            out["content"] = json!(msg.content);
        } else {
            // Multi-part content for vision models: text plus image parts.
            let mut parts = vec![json!({"type": "text", "text": msg.content})];
            for img in &msg.images {
                parts.push(json!({"type": "image_url", "image_url": {"url": img}}));
            }
            out["content"] = json!(parts);
        }

        if !msg.tool_calls.is_empty() {
            out["tool_calls"] = json!(msg
                .tool_calls
                .iter()
                .map(|tc| json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {"name": tc.name, "arguments": tc.arguments},
                }))
                .collect::<Vec<_>>());
        }
        if msg.role == Role::Tool {
            if let Some(id) = &msg.tool_call_id {
                out["tool_call_id"] = json!(id);
            }
            if let Some(name) = &msg.name {
                out["name"] = json!(name);
            }
        }

        out
    }

    fn parse_response(body: Value) -> Result<LLMResponse> {
        let message = body
            .pointer("/choices/0/message")
            .ok_or_else(|| NanoError::Provider("response has no choices".to_string()))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let tool_calls = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        let id = tc.get("id")?.as_str()?.to_string();
                        let func = tc.get("function")?;
                        let name = func.get("name")?.as_str()?.to_string();
                        let arguments = func
                            .get("arguments")
                            .and_then(|a| a.as_str())
                            .unwrap_or("{}")
                            .to_string();
                        Some(LLMToolCall { id, name, arguments })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = body
            .get("usage")
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

        Ok(LLMResponse {
            content,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(&self.default_model);
        let url = self.resolve_url(model);
        let wire_model = self.resolve_model(model);

        let mut body = json!({
            "model": wire_model,
            "messages": messages.iter().map(Self::serialize_message).collect::<Vec<_>>(),
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools
                .iter()
                .map(|t| json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                }))
                .collect::<Vec<_>>());
            body["tool_choice"] = json!("auto");
        }

        debug!(model = wire_model, url = %url, messages = messages.len(), "LLM request");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(&body);
        for (k, v) in &self.extra_headers {
            request = request.header(k, v);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(NanoError::Cancelled),
            resp = request.send() => resp?,
        };

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(NanoError::Provider(format!(
                "HTTP {} from {}: {}",
                status, url, text
            )));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| NanoError::Provider(format!("malformed response: {}", e)))?;
        Self::parse_response(parsed)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn name(&self) -> &str {
        "openai-compat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(api_base: Option<&str>) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "key",
            api_base.map(String::from),
            "openai/gpt-4o",
            HashMap::new(),
        )
    }

    #[test]
    fn test_resolve_url_explicit_base() {
        let p = provider(Some("https://example.com/v1"));
        assert_eq!(
            p.resolve_url("whatever"),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_resolve_url_full_path_kept() {
        let p = provider(Some("https://example.com/v1/chat/completions"));
        assert_eq!(
            p.resolve_url("whatever"),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_resolve_url_gateway_default() {
        let p = provider(None);
        assert_eq!(
            p.resolve_url("deepseek/deepseek-chat"),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_resolve_url_fallback_openai() {
        let p = provider(None);
        assert_eq!(
            p.resolve_url("unknown-model"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_resolve_model_strips_prefix_with_explicit_base() {
        let p = provider(Some("https://example.com/v1"));
        assert_eq!(p.resolve_model("openai/gpt-4o"), "gpt-4o");
        // Gateway prefixes stay intact
        assert_eq!(
            p.resolve_model("openrouter/meta/llama"),
            "openrouter/meta/llama"
        );
    }

    #[test]
    fn test_serialize_tool_result_message() {
        let msg = ChatMessage::tool_result("call_1", "shell", "output text");
        let v = OpenAiCompatProvider::serialize_message(&msg);
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_1");
        assert_eq!(v["name"], "shell");
        assert_eq!(v["content"], "output text");
    }

    #[test]
    fn test_serialize_user_with_images() {
        let msg = ChatMessage::user_with_images(
            "what is this?",
            vec!["data:image/png;base64,AAAA".to_string()],
        );
        let v = OpenAiCompatProvider::serialize_message(&msg);
        let parts = v["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "filesystem", "arguments": "{\"operation\":\"list\"}"},
                    }],
                },
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5},
        });
        let resp = OpenAiCompatProvider::parse_response(body).unwrap();
        assert!(resp.has_tool_calls());
        assert_eq!(resp.tool_calls[0].name, "filesystem");
        assert_eq!(resp.usage.unwrap().prompt_tokens, 10);
    }

    #[test]
    fn test_parse_response_text_only() {
        let body = json!({"choices": [{"message": {"content": "4"}}]});
        let resp = OpenAiCompatProvider::parse_response(body).unwrap();
        assert_eq!(resp.content, "4");
        assert!(!resp.has_tool_calls());
    }

    #[test]
    fn test_parse_response_no_choices_errors() {
        let resp = OpenAiCompatProvider::parse_response(json!({"error": "x"}));
        assert!(resp.is_err());
    }
}
