//! Configuration input handed to the driver factory
//!
//! The client never interprets these values beyond checking that a
//! connection string is present; they are passed through to whichever
//! driver the factory builds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while building or validating a [`ClientConfig`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No connection string was supplied
    #[error("Connection string must not be empty")]
    MissingConnectionString,

    /// An environment variable held a value that could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Driver-specific options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Requested session timeout
    /// Default: 30 seconds
    pub session_timeout: Duration,

    /// Delay between attempts to connect to the next server in the list
    /// Default: 1 second
    pub spin_delay: Duration,

    /// Number of connection retries the driver performs on its own
    /// Default: 0
    pub retries: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30),
            spin_delay: Duration::from_secs(1),
            retries: 0,
        }
    }
}

/// Connection configuration for a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Comma separated `host:port` list, optionally followed by a chroot path
    pub connection_string: String,

    /// Options passed through to the driver
    #[serde(default)]
    pub options: DriverOptions,
}

impl ClientConfig {
    /// Create a config with default driver options
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            options: DriverOptions::default(),
        }
    }

    /// Replace the driver options
    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Build a config from `ZOO_*` environment variables
    ///
    /// - `ZOO_CONNECTION_STRING` (required)
    /// - `ZOO_SESSION_TIMEOUT_MS`, `ZOO_SPIN_DELAY_MS`, `ZOO_RETRIES` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let connection_string = std::env::var("ZOO_CONNECTION_STRING")
            .map_err(|_| ConfigError::MissingConnectionString)?;

        let mut options = DriverOptions::default();
        if let Some(ms) = env_number("ZOO_SESSION_TIMEOUT_MS")? {
            options.session_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number("ZOO_SPIN_DELAY_MS")? {
            options.spin_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = env_number("ZOO_RETRIES")? {
            options.retries = u32::try_from(retries).map_err(|_| ConfigError::InvalidEnv {
                name: "ZOO_RETRIES",
                value: retries.to_string(),
            })?;
        }

        let config = Self {
            connection_string,
            options,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the config is usable
    ///
    /// Only presence is checked; the shape of the connection string is the
    /// driver's business.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::MissingConnectionString);
        }
        Ok(())
    }
}

fn env_number(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}
