//! Provider registry — model-name → provider spec resolution
//!
//! Model identifiers usually look like `"provider/model"`. The registry
//! maps a model name to the provider spec that should serve it, matching
//! first on the explicit prefix, then on keywords in the model name.
//! Gateway-type providers carry a default API base.

/// Static description of one provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Canonical name (matches the config `providers.<name>` key)
    pub name: &'static str,
    /// Keywords matched against the lowercase model name
    pub keywords: &'static [&'static str],
    /// LiteLLM-style prefix expected on outgoing model names
    pub prefix: &'static str,
    /// Default API base for gateway providers
    pub default_api_base: &'static str,
    /// Gateway providers aggregate many upstream models behind one endpoint
    pub is_gateway: bool,
}

/// All known providers, in match order.
pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openrouter",
        keywords: &["openrouter"],
        prefix: "openrouter/",
        default_api_base: "https://openrouter.ai/api/v1",
        is_gateway: true,
    },
    ProviderSpec {
        name: "anthropic",
        keywords: &["anthropic", "claude"],
        prefix: "anthropic/",
        default_api_base: "",
        is_gateway: false,
    },
    ProviderSpec {
        name: "openai",
        keywords: &["openai", "gpt"],
        prefix: "openai/",
        default_api_base: "",
        is_gateway: false,
    },
    ProviderSpec {
        name: "deepseek",
        keywords: &["deepseek"],
        prefix: "deepseek/",
        default_api_base: "https://api.deepseek.com/v1",
        is_gateway: true,
    },
    ProviderSpec {
        name: "groq",
        keywords: &["groq"],
        prefix: "groq/",
        default_api_base: "https://api.groq.com/openai/v1",
        is_gateway: true,
    },
    ProviderSpec {
        name: "gemini",
        keywords: &["gemini", "google"],
        prefix: "gemini/",
        default_api_base: "",
        is_gateway: false,
    },
    ProviderSpec {
        name: "moonshot",
        keywords: &["moonshot", "kimi"],
        prefix: "moonshot/",
        default_api_base: "",
        is_gateway: false,
    },
    ProviderSpec {
        name: "zhipu",
        keywords: &["zhipu", "glm"],
        prefix: "zhipu/",
        default_api_base: "",
        is_gateway: false,
    },
    ProviderSpec {
        name: "dashscope",
        keywords: &["dashscope", "qwen", "tongyi"],
        prefix: "dashscope/",
        default_api_base: "",
        is_gateway: false,
    },
    ProviderSpec {
        name: "siliconflow",
        keywords: &["siliconflow", "silicon"],
        prefix: "siliconflow/",
        default_api_base: "https://api.siliconflow.cn/v1",
        is_gateway: true,
    },
    ProviderSpec {
        name: "custom",
        keywords: &["custom"],
        prefix: "",
        default_api_base: "",
        is_gateway: true,
    },
];

/// Find the provider spec serving `model`, matching the explicit
/// `provider/` prefix first, then keywords anywhere in the name.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let lower = model.to_lowercase();
    let prefix = lower.split('/').next().filter(|p| lower.contains('/'));

    if let Some(prefix) = prefix {
        let normalized = prefix.replace('-', "_");
        for spec in PROVIDERS {
            if spec.name.replace('-', "_") == normalized {
                return Some(spec);
            }
        }
    }

    for spec in PROVIDERS {
        for kw in spec.keywords {
            if lower.contains(kw) {
                return Some(spec);
            }
        }
    }

    None
}

/// Find a provider spec by its canonical name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    let normalized = name.replace('-', "_");
    PROVIDERS
        .iter()
        .find(|spec| spec.name.replace('-', "_") == normalized)
}
