//! Run status and log level enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a project run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, never started.
    #[default]
    Pending,
    /// A run loop is (or was last) driving the run.
    Running,
    /// Paused by request; resumable.
    Paused,
    /// Every declared stage completed.
    Completed,
    /// A stage failed or the state was inconsistent.
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl RunStatus {
    /// Returns true if the orchestrator never leaves this status on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns true if `pause` is accepted from this status.
    #[must_use]
    pub fn is_pausable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Informational.
    #[default]
    Info,
    /// Something unexpected that did not fail the stage.
    Warn,
    /// A failure.
    Error,
    /// A step finished successfully.
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Success => write!(f, "success"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Pending.to_string(), "pending");
        assert_eq!(RunStatus::Running.to_string(), "running");
        assert_eq!(RunStatus::Paused.to_string(), "paused");
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(RunStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_run_status_is_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn test_run_status_serialize() {
        let json = serde_json::to_string(&RunStatus::Paused).unwrap();
        assert_eq!(json, r#""paused""#);

        let deserialized: RunStatus = serde_json::from_str(r#""error""#).unwrap();
        assert_eq!(deserialized, RunStatus::Error);
    }

    #[test]
    fn test_log_level_serialize() {
        let json = serde_json::to_string(&LogLevel::Success).unwrap();
        assert_eq!(json, r#""success""#);
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }
}
