//! Provider settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use storebridge_common::{Error, Result};
use storebridge_storage::{BackendOptions, ProviderConfig, DEFAULT_PROTOCOL};

use crate::retry::{RetryConfig, DEFAULT_MAX_ATTEMPTS};

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

/// Retry settings as they appear in a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Maximum number of attempts per operation, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor of the delay between consecutive retries.
    pub backoff_multiplier: f64,
    /// Whether to randomize delays by +/- 25%.
    pub jitter: bool,
}

impl RetrySettings {
    /// Build the runtime retry configuration.
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_jitter(self.jitter)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Settings of one storage provider.
///
/// Created once when the provider is built and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// Backend protocol, validated against the registry.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Options forwarded verbatim to backend construction.
    #[serde(default)]
    pub options: BackendOptions,
    /// Pre-existing directory under which local copies live.
    pub cache_root: PathBuf,
    /// Retry policy for physical operations.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl ProviderSettings {
    /// Create settings for the default protocol.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            protocol: default_protocol(),
            options: BackendOptions::new(),
            cache_root: cache_root.into(),
            retry: RetrySettings::default(),
        }
    }

    /// Set the protocol.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Add a backend option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Set the retry settings.
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// The backend part of the settings.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            protocol: self.protocol.clone(),
            options: self.options.clone(),
        }
    }

    /// Deserialize settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize settings to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Load settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }
}
