//! LLM provider module
//!
//! Defines the provider trait and wire types, the model-name → provider
//! registry, and the OpenAI-compatible HTTP implementation that serves
//! every registry entry.

mod openai;
mod registry;
mod types;

pub use openai::OpenAiCompatProvider;
pub use registry::{find_by_model, find_by_name, ProviderSpec, PROVIDERS};
pub use types::{
    ChatMessage, ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage,
};

use std::sync::Arc;

use crate::config::Config;
use crate::error::{NanoError, Result};

/// Build the provider for the configured model.
///
/// Picks the `providers.<name>` config block matching the model's provider
/// spec; falls back to the first configured block with an API key. Fails
/// when no credentials are configured at all.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let model = &config.agents.defaults.model;
    let spec = find_by_model(model);

    let block = spec
        .and_then(|s| config.providers.get(s.name))
        .or_else(|| config.providers.values().find(|p| !p.api_key.is_empty()));

    let Some(block) = block else {
        return Err(NanoError::Config(format!(
            "no provider configured for model '{}' (set providers.<name>.apiKey)",
            model
        )));
    };
    if block.api_key.is_empty() {
        return Err(NanoError::Config(format!(
            "provider for model '{}' has an empty apiKey",
            model
        )));
    }

    Ok(Arc::new(OpenAiCompatProvider::new(
        &block.api_key,
        block.api_base.clone(),
        model,
        block.extra_headers.clone(),
    )))
}
