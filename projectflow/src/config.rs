//! Configuration types for the orchestrator.
//!
//! Every field has a serde default so partial documents deserialize, and
//! [`OrchestratorConfig::from_env`] layers `PROJECTFLOW_*` environment
//! overrides on top of the defaults.

use crate::errors::ProjectflowError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding [`OrchestratorConfig::event_buffer`].
pub const ENV_EVENT_BUFFER: &str = "PROJECTFLOW_EVENT_BUFFER";
/// Environment variable overriding [`OrchestratorConfig::state_dir`].
pub const ENV_STATE_DIR: &str = "PROJECTFLOW_STATE_DIR";
/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG_LEVEL: &str = "PROJECTFLOW_LOG_LEVEL";
/// Environment variable overriding [`LoggingConfig::json`].
pub const ENV_LOG_JSON: &str = "PROJECTFLOW_LOG_JSON";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the orchestrator and its event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Capacity of the broadcast event buffer per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Limit stage inputs to the stage's transitive dependencies.
    #[serde(default = "default_strict_inputs")]
    pub strict_inputs: bool,
    /// Directory for the JSON-file store, if one is used.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_event_buffer() -> usize {
    256
}

fn default_strict_inputs() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            strict_inputs: default_strict_inputs(),
            state_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ProjectflowError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// `from_env` passes `std::env::var`; tests pass a map.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ProjectflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_EVENT_BUFFER) {
            let buffer = raw.trim().parse::<usize>().map_err(|_| {
                ProjectflowError::Config(format!("{ENV_EVENT_BUFFER} must be a positive integer, got '{raw}'"))
            })?;
            self = self.with_event_buffer(buffer)?;
        }

        if let Some(raw) = lookup(ENV_STATE_DIR) {
            let trimmed = raw.trim();
            self.state_dir = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
        }

        if let Some(raw) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = parse_log_level(&raw)?;
        }

        if let Some(raw) = lookup(ENV_LOG_JSON) {
            self.logging.json = parse_bool(ENV_LOG_JSON, &raw)?;
        }

        Ok(self)
    }

    /// Sets the event buffer capacity.
    pub fn with_event_buffer(mut self, buffer: usize) -> Result<Self, ProjectflowError> {
        if buffer == 0 {
            return Err(ProjectflowError::Config(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        self.event_buffer = buffer;
        Ok(self)
    }

    /// Sets whether stage inputs are limited to dependencies.
    #[must_use]
    pub fn with_strict_inputs(mut self, strict: bool) -> Self {
        self.strict_inputs = strict;
        self
    }

    /// Sets the state directory.
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

/// Logging configuration consumed by
/// [`init_tracing`](crate::observability::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a logging configuration with the given level.
    pub fn with_level(level: &str) -> Result<Self, ProjectflowError> {
        Ok(Self {
            level: parse_log_level(level)?,
            ..Self::default()
        })
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: default_log_level(),
            json: true,
        }
    }
}

fn parse_log_level(raw: &str) -> Result<String, ProjectflowError> {
    let level = raw.trim().to_ascii_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(ProjectflowError::Config(format!(
            "invalid log level '{raw}', expected one of: {}",
            LOG_LEVELS.join(", ")
        )))
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ProjectflowError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ProjectflowError::Config(format!(
            "{key} must be a boolean, got '{raw}'"
        ))),
    }
}
