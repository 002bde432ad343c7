//! Configuration type definitions for nanogrip
//!
//! All types derive serde with `camelCase` renaming so the YAML keys match
//! the documented surface (`maxTokens`, `allowFrom`, `replyInThread`, ...).
//! Every struct has defaults; an empty config file is a valid config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Agent behaviour defaults
    pub agents: AgentsConfig,
    /// Channel adapters
    pub channels: ChannelsConfig,
    /// LLM provider credentials, keyed by provider name
    pub providers: HashMap<String, ProviderConfig>,
    /// Gateway listen address
    pub gateway: GatewayConfig,
    /// Tool settings
    pub tools: ToolsConfig,
    /// MCP server definitions (loaded by the external MCP plug-in loader)
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

/// Agent configuration block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Defaults applied to every agent run
    pub defaults: AgentDefaults,
}

/// Default agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentDefaults {
    /// Workspace root (sessions, memory, skills, todos live under it)
    pub workspace: String,
    /// Model identifier, usually "provider/model"
    pub model: String,
    /// Max tokens per LLM response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Hard cap on LLM↔tool iterations per turn
    pub max_tool_iterations: u32,
    /// How many history entries a turn may carry
    pub memory_window: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.nanogrip/workspace".to_string(),
            model: "anthropic/claude-opus-4-5".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            memory_window: 50,
        }
    }
}

/// One LLM provider block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    /// API key
    pub api_key: String,
    /// Optional API base URL override
    pub api_base: Option<String>,
    /// Extra HTTP headers sent with every request
    pub extra_headers: HashMap<String, String>,
}

/// Channel adapter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelsConfig {
    pub telegram: TelegramConfig,
    pub whatsapp: WhatsAppConfig,
    pub discord: DiscordConfig,
    pub slack: SlackConfig,
    pub dingtalk: DingTalkConfig,
}

/// Telegram bot adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Bot token from BotFather
    pub token: String,
    /// Sender allowlist (ids, optionally "id|username" composites)
    pub allow_from: Vec<String>,
    /// Optional proxy URL for restricted networks
    pub proxy: String,
}

/// WhatsApp bridge adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WhatsAppConfig {
    pub enabled: bool,
    /// Bridge service base URL
    pub bridge_url: String,
    /// Bridge bearer token
    pub bridge_token: String,
    pub allow_from: Vec<String>,
}

/// Discord adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscordConfig {
    pub enabled: bool,
    pub token: String,
    pub allow_from: Vec<String>,
}

/// Slack adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlackConfig {
    pub enabled: bool,
    /// Bot token ("xoxb-...")
    pub bot_token: String,
    /// Webhook path served by the gateway (e.g. "/webhook/slack")
    pub webhook_path: String,
    /// Reply in the originating thread instead of the channel
    pub reply_in_thread: bool,
    pub allow_from: Vec<String>,
}

/// DingTalk robot adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DingTalkConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub allow_from: Vec<String>,
}

/// Gateway HTTP listen address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18790,
        }
    }
}

/// Tool configuration block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolsConfig {
    pub web: WebToolsConfig,
    pub exec: ExecToolConfig,
    /// When true, filesystem tool paths must resolve within the workspace
    pub restrict_to_workspace: bool,
}

/// Web tool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebToolsConfig {
    pub search: WebSearchConfig,
}

/// Web search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSearchConfig {
    pub api_key: String,
    /// "brave" or "tavily"
    pub provider: String,
    pub max_results: u32,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            provider: "brave".to_string(),
            max_results: 5,
        }
    }
}

/// Shell execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecToolConfig {
    /// Command timeout in seconds
    pub timeout: u64,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self { timeout: 60 }
    }
}

/// An MCP server definition: either stdio (`command`) or SSE (`url`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub url: String,
    pub headers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.agents.defaults.max_tokens, 8192);
        assert_eq!(cfg.agents.defaults.temperature, 0.7);
        assert_eq!(cfg.agents.defaults.max_tool_iterations, 20);
        assert_eq!(cfg.agents.defaults.memory_window, 50);
        assert_eq!(cfg.gateway.port, 18790);
        assert_eq!(cfg.gateway.host, "0.0.0.0");
        assert_eq!(cfg.tools.exec.timeout, 60);
        assert!(!cfg.tools.restrict_to_workspace);
    }

    #[test]
    fn test_yaml_camel_case_keys() {
        let yaml = r#"
agents:
  defaults:
    model: openai/gpt-4o
    maxTokens: 4096
    maxToolIterations: 5
    memoryWindow: 10
channels:
  telegram:
    enabled: true
    token: "tok"
    allowFrom: ["123", "456|alice"]
tools:
  exec:
    timeout: 30
  restrictToWorkspace: true
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.agents.defaults.model, "openai/gpt-4o");
        assert_eq!(cfg.agents.defaults.max_tokens, 4096);
        assert_eq!(cfg.agents.defaults.max_tool_iterations, 5);
        assert_eq!(cfg.agents.defaults.memory_window, 10);
        assert!(cfg.channels.telegram.enabled);
        assert_eq!(cfg.channels.telegram.allow_from.len(), 2);
        assert_eq!(cfg.tools.exec.timeout, 30);
        assert!(cfg.tools.restrict_to_workspace);
    }

    #[test]
    fn test_yaml_providers_map() {
        let yaml = r#"
providers:
  openrouter:
    apiKey: "sk-or-xxx"
    apiBase: "https://openrouter.ai/api/v1"
    extraHeaders:
      X-Title: "nanogrip"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let p = cfg.providers.get("openrouter").unwrap();
        assert_eq!(p.api_key, "sk-or-xxx");
        assert_eq!(p.api_base.as_deref(), Some("https://openrouter.ai/api/v1"));
        assert_eq!(p.extra_headers.get("X-Title").unwrap(), "nanogrip");
    }

    #[test]
    fn test_empty_yaml_is_valid() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.agents.defaults.workspace, "~/.nanogrip/workspace");
    }

    #[test]
    fn test_mcp_servers() {
        let yaml = r#"
mcpServers:
  files:
    command: "mcp-files"
    args: ["--root", "/tmp"]
  remote:
    url: "https://example.com/sse"
    headers:
      Authorization: "Bearer x"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.mcp_servers.len(), 2);
        assert_eq!(cfg.mcp_servers["files"].command, "mcp-files");
        assert_eq!(cfg.mcp_servers["remote"].url, "https://example.com/sse");
    }
}
