//! `web_search` tool — Brave Search and Tavily backends.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::WebSearchConfig;
use crate::error::{NanoError, Result};

use super::types::str_arg;
use super::{Tool, ToolContext};

/// One normalized search hit.
#[derive(Debug, Serialize)]
struct SearchResult {
    title: String,
    description: String,
    url: String,
}

/// Web search via Brave Search or Tavily, selected by config.
pub struct WebSearchTool {
    api_key: String,
    provider: String,
    max_results: u32,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(config: &WebSearchConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            provider: config.provider.clone(),
            max_results: config.max_results,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn search_brave(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .query(&[("q", query), ("count", &self.max_results.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NanoError::Tool(format!(
                "search API returned status {}: {}",
                status, body
            )));
        }

        let parsed: Value = serde_json::from_str(&body)?;
        let results = parsed
            .pointer("/web/results")
            .and_then(|r| r.as_array())
            .map(|hits| {
                hits.iter()
                    .map(|hit| SearchResult {
                        title: hit.get("title").and_then(|v| v.as_str()).unwrap_or("").into(),
                        description: hit
                            .get("description")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .into(),
                        url: hit.get("url").and_then(|v| v.as_str()).unwrap_or("").into(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(serde_json::to_string(&results)?)
    }

    async fn search_tavily(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .post("https://api.tavily.com/search")
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NanoError::Tool(format!(
                "Tavily API returned status {}: {}",
                status, body
            )));
        }

        let parsed: Value = serde_json::from_str(&body)?;
        let results = parsed
            .get("results")
            .and_then(|r| r.as_array())
            .map(|hits| {
                hits.iter()
                    .map(|hit| SearchResult {
                        title: hit.get("title").and_then(|v| v.as_str()).unwrap_or("").into(),
                        description: hit
                            .get("content")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .into(),
                        url: hit.get("url").and_then(|v| v.as_str()).unwrap_or("").into(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(serde_json::to_string(&results)?)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Use this for up-to-date facts, news, \
         weather, or anything beyond your training data."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query",
                },
            },
            "required": ["query"],
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        args: Value,
        _ctx: &ToolContext,
    ) -> Result<String> {
        let query = str_arg(&args, "query")
            .ok_or_else(|| NanoError::Tool("missing or invalid query parameter".into()))?;

        if self.api_key.is_empty() {
            return Err(NanoError::Tool("web search API key not configured".into()));
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(NanoError::Cancelled),
            result = async {
                match self.provider.as_str() {
                    "tavily" => self.search_tavily(query).await,
                    _ => self.search_brave(query).await,
                }
            } => result,
        }
    }
}
