// Credential lookup for the completion service
//
// Resolution order: RESEARCH_API_KEY environment variable, then
// ~/.research-pipeline/secrets.toml (`[api_tokens] <provider> = "..."`).
// A missing credential is reported to callers, never silently replaced.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the completion service credential
pub const API_KEY_ENV: &str = "RESEARCH_API_KEY";

/// Secrets stored in ~/.research-pipeline/secrets.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// API tokens indexed by provider ID (e.g., "anthropic" -> "sk-...")
    #[serde(default)]
    pub api_tokens: HashMap<String, String>,
}

impl SecretsConfig {
    /// Get the secrets file path (~/.research-pipeline/secrets.toml)
    pub fn get_secrets_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".research-pipeline").join("secrets.toml"))
    }

    /// Load secrets from the default location
    pub fn load() -> Result<Self> {
        let path = Self::get_secrets_path()
            .ok_or_else(|| anyhow!("Could not determine home directory"))?;
        Self::load_from_path(&path)
    }

    /// Load secrets from a specific file; a missing file means no secrets
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read secrets file '{}': {}", path.display(), e))?;

        let config: SecretsConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse secrets file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Get a provider's API token, ignoring blank entries
    pub fn get_token(&self, provider_id: &str) -> Option<&String> {
        self.api_tokens
            .get(provider_id)
            .filter(|token| !token.trim().is_empty())
    }

    /// Check if a provider has a token configured
    pub fn has_token(&self, provider_id: &str) -> bool {
        self.get_token(provider_id).is_some()
    }
}

/// Pick the credential for a provider from an env value and the secrets file
pub fn resolve_credential(
    provider_id: &str,
    env_value: Option<String>,
    secrets: &SecretsConfig,
) -> Option<String> {
    env_value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| secrets.get_token(provider_id).cloned())
}

/// Load the credential for a provider from the process environment and disk.
/// An unreadable secrets file is logged and treated as absent.
pub fn load_credential(provider_id: &str) -> Option<String> {
    let secrets = match SecretsConfig::load() {
        Ok(secrets) => secrets,
        Err(e) => {
            log::warn!("Ignoring secrets file: {}", e);
            SecretsConfig::default()
        }
    };

    let credential = resolve_credential(provider_id, std::env::var(API_KEY_ENV).ok(), &secrets);
    if credential.is_none() {
        log::warn!(
            "No credential for provider '{}' (set {} or add it to the secrets file); job creation will be rejected",
            provider_id,
            API_KEY_ENV
        );
    }
    credential
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_secrets_config_default() {
        let config = SecretsConfig::default();
        assert!(config.api_tokens.is_empty());
    }

    #[test]
    fn test_load_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secrets.toml");
        fs::write(&path, "[api_tokens]\nanthropic = \"sk-12345\"\nopenai = \"  \"\n").unwrap();

        let secrets = SecretsConfig::load_from_path(&path).unwrap();
        assert_eq!(secrets.get_token("anthropic"), Some(&"sk-12345".to_string()));
        assert!(!secrets.has_token("openai"));
        assert!(!secrets.has_token("zai"));
    }

    #[test]
    fn test_missing_file_means_no_secrets() {
        let temp_dir = TempDir::new().unwrap();
        let secrets = SecretsConfig::load_from_path(&temp_dir.path().join("nope.toml")).unwrap();
        assert!(secrets.api_tokens.is_empty());
    }

    #[test]
    fn test_env_value_wins_over_file() {
        let mut secrets = SecretsConfig::default();
        secrets
            .api_tokens
            .insert("anthropic".to_string(), "from-file".to_string());

        assert_eq!(
            resolve_credential("anthropic", Some("from-env".to_string()), &secrets),
            Some("from-env".to_string())
        );
        assert_eq!(
            resolve_credential("anthropic", Some("   ".to_string()), &secrets),
            Some("from-file".to_string())
        );
        assert_eq!(resolve_credential("openai", None, &secrets), None);
    }
}
