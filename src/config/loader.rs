// Configuration file loading

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::retry::RetryConfig;

/// Pipeline configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Completion service settings
    #[serde(default)]
    pub completion: CompletionSettings,
    /// Subtask execution settings
    #[serde(default)]
    pub subtasks: SubtaskSettings,
    /// Recombination settings
    #[serde(default)]
    pub synthesis: SynthesisSettings,
    /// Caller-side polling settings
    #[serde(default)]
    pub poller: PollerSettings,
    /// Progress publishing settings
    #[serde(default)]
    pub progress: ProgressSettings,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,
}

/// Completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// Provider preset id ("anthropic", "openai", "zai")
    pub provider: String,
    /// Overrides the preset's base URL
    pub base_url: Option<String>,
    /// Overrides the preset's default model
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Token budget for the degraded subtask attempt
    pub degraded_max_tokens: u32,
    pub temperature: f32,
    /// Hard wall-clock limit per completion call
    pub timeout_secs: u64,
    /// Transport-level retries inside a single call
    pub retry: RetryConfig,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            base_url: None,
            model: None,
            max_tokens: 4000,
            degraded_max_tokens: 1200,
            temperature: 0.7,
            timeout_secs: 60,
            retry: RetryConfig::completion(),
        }
    }
}

impl CompletionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Subtask execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtaskSettings {
    /// Run the three subtasks concurrently instead of one after another
    pub parallel: bool,
    pub retry: RetryConfig,
}

impl Default for SubtaskSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            retry: RetryConfig::subtask(),
        }
    }
}

/// Recombination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub retry: RetryConfig,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            temperature: 0.5,
            retry: RetryConfig::subtask(),
        }
    }
}

/// Job poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub growth: f64,
    /// Uniform jitter upper bound added to every delay
    pub jitter_ms: u64,
    /// Consecutive transport failures tolerated before giving up
    pub max_consecutive_failures: u32,
    /// Status checks before the whole job is considered timed out
    pub max_attempts: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 2000,
            max_delay_ms: 15000,
            growth: 1.2,
            jitter_ms: 500,
            max_consecutive_failures: 3,
            max_attempts: 120,
        }
    }
}

impl PollerSettings {
    /// Delay schedule between status checks
    pub fn delay_schedule(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
            backoff_multiplier: self.growth,
            jitter_ms: self.jitter_ms,
        }
    }
}

/// Progress publishing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Interval of the synthetic heartbeat while a phase has no native signal; 0 disables it
    pub heartbeat_interval_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 3000,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub bind: String,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3420,
            bind: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    path: Option<PathBuf>,
    /// Set when the path came from the user; such a file must exist
    explicit: bool,
}

impl ConfigLoader {
    /// Create a loader pointing at the default config file
    pub fn new() -> Self {
        Self {
            path: Self::get_default_config_path(),
            explicit: false,
        }
    }

    /// Use an explicit config file instead of the default location
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self.explicit = true;
        self
    }

    /// Get the default config path (~/.research-pipeline/config.toml)
    fn get_default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".research-pipeline").join("config.toml"))
    }

    /// Load the config. A missing default file yields defaults; a missing
    /// explicit file is an error.
    pub fn load(&self) -> Result<PipelineConfig> {
        let Some(ref path) = self.path else {
            return Ok(PipelineConfig::default());
        };

        match self.load_from_path(path)? {
            Some(config) => Ok(config),
            None if self.explicit => Err(anyhow!(
                "Config file '{}' does not exist",
                path.display()
            )),
            None => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(PipelineConfig::default())
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<Option<PipelineConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: PipelineConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

        validate_config(&config)?;

        log::debug!("Loaded config from {}", path.display());
        Ok(Some(config))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config values
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.completion.timeout_secs == 0 {
        return Err(anyhow!("completion.timeout_secs must be greater than 0"));
    }

    if config.completion.max_tokens == 0 || config.completion.degraded_max_tokens == 0 {
        return Err(anyhow!("completion token budgets must be greater than 0"));
    }

    if !(0.0..=2.0).contains(&config.completion.temperature) {
        return Err(anyhow!("completion.temperature must be between 0.0 and 2.0"));
    }

    for (name, retry) in [
        ("completion.retry", &config.completion.retry),
        ("subtasks.retry", &config.subtasks.retry),
        ("synthesis.retry", &config.synthesis.retry),
    ] {
        if retry.max_attempts == 0 {
            return Err(anyhow!("{}.max_attempts must be greater than 0", name));
        }
        if retry.backoff_multiplier < 1.0 {
            return Err(anyhow!("{}.backoff_multiplier cannot be below 1.0", name));
        }
    }

    if config.poller.max_attempts == 0 {
        return Err(anyhow!("poller.max_attempts must be greater than 0"));
    }

    if config.poller.min_delay_ms > config.poller.max_delay_ms {
        return Err(anyhow!("poller.min_delay_ms cannot exceed poller.max_delay_ms"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_policies() {
        let config = PipelineConfig::default();
        assert_eq!(config.completion.retry.max_attempts, 3);
        assert_eq!(config.completion.retry.initial_delay_ms, 1000);
        assert_eq!(config.completion.retry.max_delay_ms, 8000);
        assert_eq!(config.poller.min_delay_ms, 2000);
        assert_eq!(config.poller.max_delay_ms, 15000);
        assert_eq!(config.poller.jitter_ms, 500);
        assert!(config.subtasks.parallel);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_loads_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config_content = r#"
[completion]
provider = "openai"
timeout_secs = 30

[completion.retry]
max_attempts = 5

[subtasks]
parallel = false

[server]
port = 8080
"#;
        fs::write(&path, config_content).unwrap();

        let config = ConfigLoader::new().with_path(&path).load().unwrap();
        assert_eq!(config.completion.provider, "openai");
        assert_eq!(config.completion.timeout_secs, 30);
        assert_eq!(config.completion.retry.max_attempts, 5);
        // Unspecified fields keep their defaults
        assert_eq!(config.completion.retry.initial_delay_ms, 1000);
        assert_eq!(config.completion.max_tokens, 4000);
        assert!(!config.subtasks.parallel);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[test]
    fn test_missing_default_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader {
            path: Some(temp_dir.path().join("absent.toml")),
            explicit: false,
        };

        let config = loader.load().unwrap();
        assert_eq!(config.completion.provider, "anthropic");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");

        let err = ConfigLoader::new().with_path(&path).load().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[completion]\ntimeout_secs = 0\n").unwrap();

        let result = ConfigLoader::new().with_path(&path).load();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[completion\nprovider = ").unwrap();

        let result = ConfigLoader::new().with_path(&path).load();
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_poller_delay_schedule() {
        let schedule = PollerSettings::default().delay_schedule();
        assert_eq!(schedule.base_delay_ms(1), 2000);
        assert_eq!(schedule.base_delay_ms(2), 2400);
        assert_eq!(schedule.base_delay_ms(50), 15000);
    }
}
