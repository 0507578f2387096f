//! Bridge configuration, loaded from TOML.
//!
//! ```toml
//! jenkins_url = "https://ci.example.com"
//! webhook_path = "spacecode-webhook/"
//! service_name = "Jenkins"
//!
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 2000
//! max_delay_ms = 16000
//! backoff_multiplier = 2.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::space::RetryConfig;

pub const DEFAULT_WEBHOOK_PATH: &str = "spacecode-webhook/";
pub const DEFAULT_SERVICE_NAME: &str = "Jenkins";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Retry settings as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::DEFAULT;
        RetrySettings {
            max_retries: defaults.max_retries,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier,
        }
    }
}

impl From<RetrySettings> for RetryConfig {
    fn from(settings: RetrySettings) -> Self {
        RetryConfig {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Root URL of this CI server.
    pub jenkins_url: String,
    /// Path under `jenkins_url` that receives webhook deliveries.
    pub webhook_path: String,
    /// Reported as the `serviceName` of external check statuses.
    pub service_name: String,
    pub retry: RetrySettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            jenkins_url: String::new(),
            webhook_path: DEFAULT_WEBHOOK_PATH.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.jenkins_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("jenkins_url is required".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "jenkins_url must be an http(s) URL, got `{url}`"
            )));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry.into()
    }

    /// URL SpaceCode posts webhook deliveries to.
    pub fn webhook_endpoint(&self) -> String {
        format!("{}/{}", self.base_url(), self.webhook_path.trim_start_matches('/'))
    }

    /// Absolute URL of a path relative to the CI root.
    pub fn absolute_url(&self, relative: &str) -> String {
        if relative.starts_with("http://") || relative.starts_with("https://") {
            return relative.to_string();
        }
        format!("{}/{}", self.base_url(), relative.trim_start_matches('/'))
    }

    fn base_url(&self) -> &str {
        self.jenkins_url.trim().trim_end_matches('/')
    }
}
