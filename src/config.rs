use crate::constants::{
    DEFAULT_REMOTE_TIMEOUT, DEFAULT_REMOVE_BG_ENDPOINT, ENV_API_KEY, ENV_ENDPOINT,
    ENV_TIMEOUT_SECS, REMOVE_BG_SIZE,
};
use crate::error::ConfigError;
use reqwest::Url;
use std::fmt;
use std::time::Duration;

/// Connection settings for the background-removal service.
///
/// The API key is always injected at run time, never compiled in.
#[derive(Clone, PartialEq)]
pub struct RemoveBgConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
    /// Value of the provider's `size` field
    pub size: String,
}

impl fmt::Debug for RemoveBgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveBgConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("size", &self.size)
            .finish()
    }
}

impl RemoveBgConfig {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_REMOVE_BG_ENDPOINT.to_string()),
            api_key: api_key.into(),
            timeout: timeout.unwrap_or(DEFAULT_REMOTE_TIMEOUT),
            size: REMOVE_BG_SIZE.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads `REMOVE_BG_API_KEY`, `REMOVE_BG_ENDPOINT` and `REMOVE_BG_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`RemoveBgConfig::from_env`] over an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY).unwrap_or_default();
        let endpoint = lookup(ENV_ENDPOINT).filter(|value| !value.trim().is_empty());
        let timeout = lookup(ENV_TIMEOUT_SECS)
            .map(|raw| parse_timeout_secs(&raw))
            .transpose()?;
        Self::new(api_key, endpoint, timeout)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        self.endpoint = endpoint.into();
        self.validate()?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        self.timeout = timeout;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey(ENV_API_KEY));
        }
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {}", self.endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(format!(
                "{}: scheme must be http or https",
                self.endpoint
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                ENV_TIMEOUT_SECS,
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn parse_timeout_secs(raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidValue(ENV_TIMEOUT_SECS, format!("{:?}: {}", raw, e)))
}
