// Builtin completion provider presets
//
// Anthropic-compatible providers (z.ai, MiniMax) share the Messages API shape;
// OpenAI-compatible providers use the chat completions shape.

use serde::{Deserialize, Serialize};

/// Request/response shape spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// POST {base}/v1/messages, text in `content[].text`
    AnthropicMessages,
    /// POST {base}/v1/chat/completions, text in `choices[0].message.content`
    OpenAiChat,
}

/// A builtin API provider preset
/// Note: This is hardcoded data, not deserialized from files
#[derive(Debug, Clone)]
pub struct ApiProviderPreset {
    /// Provider ID (e.g., "anthropic", "openai", "zai")
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Base URL for the API
    pub base_url: &'static str,
    /// Model used when the config does not name one
    pub default_model: &'static str,
    pub api_style: ApiStyle,
}

impl ApiProviderPreset {
    /// Full URL of the completion endpoint for a base URL
    pub fn endpoint(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self.api_style {
            ApiStyle::AnthropicMessages => format!("{}/v1/messages", base),
            ApiStyle::OpenAiChat => format!("{}/v1/chat/completions", base),
        }
    }
}

/// Builtin API provider presets
pub static PROVIDERS: &[ApiProviderPreset] = &[
    ApiProviderPreset {
        id: "anthropic",
        name: "Anthropic (Direct)",
        base_url: "https://api.anthropic.com",
        default_model: "claude-sonnet-4-5",
        api_style: ApiStyle::AnthropicMessages,
    },
    ApiProviderPreset {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com",
        default_model: "gpt-4o-mini",
        api_style: ApiStyle::OpenAiChat,
    },
    ApiProviderPreset {
        id: "zai",
        name: "Z.AI",
        base_url: "https://api.z.ai/api/anthropic",
        default_model: "GLM-4.7",
        api_style: ApiStyle::AnthropicMessages,
    },
    ApiProviderPreset {
        id: "minimax",
        name: "MiniMax",
        base_url: "https://api.minimax.io/anthropic",
        default_model: "MiniMax-M2.1",
        api_style: ApiStyle::AnthropicMessages,
    },
];

/// Get a provider preset by ID
pub fn get_provider_preset(id: &str) -> Option<&'static ApiProviderPreset> {
    PROVIDERS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_provider_preset() {
        let anthropic = get_provider_preset("anthropic").unwrap();
        assert_eq!(anthropic.name, "Anthropic (Direct)");
        assert_eq!(anthropic.api_style, ApiStyle::AnthropicMessages);
        assert!(get_provider_preset("nonexistent").is_none());
    }

    #[test]
    fn test_endpoint_per_style() {
        let anthropic = get_provider_preset("anthropic").unwrap();
        assert_eq!(
            anthropic.endpoint("https://api.anthropic.com/"),
            "https://api.anthropic.com/v1/messages"
        );

        let openai = get_provider_preset("openai").unwrap();
        assert_eq!(
            openai.endpoint(openai.base_url),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_preset_ids_unique() {
        for (i, a) in PROVIDERS.iter().enumerate() {
            for b in PROVIDERS.iter().skip(i + 1) {
                assert_ne!(a.id, b.id);
            }
        }
    }
}
