//! Logging setup for applications built on zoo-sdk
//!
//! Every component reports through `tracing`. Nothing is printed unless the
//! application installs a subscriber, either its own or one of the presets
//! below.
//!
//! # Environment Variables
//!
//! - `ZOO_LOG_MODE`: preset picked by [`init_logging_from_env`]
//!   (`silent`, `development`/`dev`, `debug`)
//! - `ZOO_LOG_LEVEL`: filter directives, e.g. `debug` or
//!   `zoo_client=trace,zoo_driver=info`
//! - `RUST_LOG`: used when `ZOO_LOG_LEVEL` is unset

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Preset subscriber configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// Install nothing; events are discarded
    Silent,
    /// Compact stderr output at `info`
    Development,
    /// Pretty output at `debug` with threads and source locations
    Debug,
}

impl LoggingMode {
    /// Parse the value of `ZOO_LOG_MODE`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "silent" => Some(LoggingMode::Silent),
            "development" | "dev" => Some(LoggingMode::Development),
            "debug" => Some(LoggingMode::Debug),
            _ => None,
        }
    }

    fn default_level(&self) -> &'static str {
        match self {
            LoggingMode::Silent => "off",
            LoggingMode::Development => "info",
            LoggingMode::Debug => "debug",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
}

/// Install a global subscriber for `mode`.
///
/// Call once, early. A second call fails with [`LoggingError::TracingInit`]
/// because a global subscriber is already set.
///
/// The level comes from `ZOO_LOG_LEVEL`, then `RUST_LOG`, then the mode's
/// default.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter(mode.default_level())?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter(mode.default_level())?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Install a subscriber chosen by `ZOO_LOG_MODE`
/// (`silent`, `development` or `debug`; silent when unset or unknown).
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = std::env::var("ZOO_LOG_MODE")
        .ok()
        .and_then(|name| LoggingMode::from_name(&name))
        .unwrap_or(LoggingMode::Silent);

    init_logging(mode)
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var("ZOO_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter {
        filter: directives,
        reason: e.to_string(),
    })
}

/// Explicit no-op setup for applications that own stdout and stderr
///
/// Equivalent to `init_logging(LoggingMode::Silent)`.
pub fn init_silent() -> Result<(), LoggingError> {
    init_logging(LoggingMode::Silent)
}

/// Whether a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
