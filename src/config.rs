//! Client configuration, loaded from an optional toml file and overridden by
//! command-line flags.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::protocol::{endpoint_url, Pipeline, CHAT_PATH};

pub const DEFAULT_HOST: &str = "127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// `host[:port]` of the backend.
    pub host: String,
    /// Use `wss` instead of `ws`.
    pub secure: bool,
    /// Socket path on the host.
    pub path: String,
    /// Seconds to wait for a reply after each send; 0 disables the timer.
    pub request_timeout_secs: u64,
    pub default_pipeline: Pipeline,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            secure: false,
            path: CHAT_PATH.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_pipeline: Pipeline::Consistency,
        }
    }
}

impl ClientConfig {
    /// Parse a toml document. Missing keys take their defaults.
    pub fn from_toml(source: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let source = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: display.clone(), source })?;
        Self::from_toml(&source, &display)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self.host.trim();
        if host.is_empty() || host.contains("://") || host.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        Ok(())
    }

    pub fn url(&self) -> String {
        endpoint_url(self.host.trim(), self.secure, &self.path)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
