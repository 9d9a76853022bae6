// Configuration: settings file, provider presets and credentials

pub mod loader;
pub mod providers;
pub mod secrets;

pub use loader::{
    validate_config, CompletionSettings, ConfigLoader, PipelineConfig, PollerSettings,
    ProgressSettings, ServerSettings, SubtaskSettings, SynthesisSettings,
};
pub use providers::{get_provider_preset, ApiProviderPreset, ApiStyle, PROVIDERS};
pub use secrets::{load_credential, resolve_credential, SecretsConfig, API_KEY_ENV};
