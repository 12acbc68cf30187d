use crate::preset::PresetSettings;
use crate::retry::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/completion.yaml";
pub const DEFAULT_COMPLETION_PATH: &str = "/testapp/v1/chat-completions/HCX-003";
pub const DEFAULT_REQUEST_ID_HEADER: &str = "X-NCP-CLOVASTUDIO-REQUEST-ID";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,
    #[serde(default)]
    pub presets: HashMap<String, PresetSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub host_url: String,
    pub api_key: String,
    #[serde(default = "new_request_id")]
    pub request_id: String,
    #[serde(default = "default_completion_path")]
    pub completion_path: String,
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiSettings {
    pub fn new(host_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host_url: host_url.into(),
            api_key: api_key.into(),
            request_id: new_request_id(),
            completion_path: default_completion_path(),
            request_id_header: default_request_id_header(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.host_url.trim_end_matches('/'),
            self.completion_path
        )
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            min_response_chars: default_min_response_chars(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_secs(self.max_delay_secs),
        )
        .with_min_response_chars(self.min_response_chars)
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads `.env`, then the YAML file at `path` if it exists, then
    /// `COMPLETION__`-prefixed environment overrides
    /// (e.g. `COMPLETION__API__API_KEY`).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = path.as_ref();
        tracing::debug!("loading settings from {}", path.display());

        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("COMPLETION")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn preset(&self, name: &str) -> Option<&PresetSettings> {
        self.presets.get(name)
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_completion_path() -> String {
    DEFAULT_COMPLETION_PATH.to_string()
}

fn default_request_id_header() -> String {
    DEFAULT_REQUEST_ID_HEADER.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    5000
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_min_response_chars() -> usize {
    1
}

fn default_max_parallel_tasks() -> usize {
    1
}
