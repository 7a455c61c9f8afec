//! The project run aggregate and its read snapshot.

use super::{ExecutionState, ProjectConfig};
use crate::core::{LogLevel, RunStatus};
use crate::utils::{generate_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// One execution of the stage pipeline for a single configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRun {
    /// Run identifier, assigned at creation.
    pub id: String,
    /// Immutable project configuration.
    pub config: ProjectConfig,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Progress record.
    #[serde(default)]
    pub execution_state: ExecutionState,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the last persisted change.
    pub updated_at: Timestamp,
}

impl ProjectRun {
    /// Creates a pending run with a fresh identifier.
    #[must_use]
    pub fn new(config: ProjectConfig) -> Self {
        Self::with_id(generate_id(), config)
    }

    /// Creates a pending run with the given identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>, config: ProjectConfig) -> Self {
        let now = now_utc();
        Self {
            id: id.into(),
            config,
            status: RunStatus::Pending,
            execution_state: ExecutionState::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a read-only copy for transport collaborators.
    #[must_use]
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot::from(self.clone())
    }
}

/// Read view of a run returned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Run identifier.
    pub id: String,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Project configuration.
    pub config: ProjectConfig,
    /// Progress record.
    pub execution_state: ExecutionState,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the last persisted change.
    pub updated_at: Timestamp,
}

impl From<ProjectRun> for RunSnapshot {
    fn from(run: ProjectRun) -> Self {
        Self {
            id: run.id,
            status: run.status,
            config: run.config,
            execution_state: run.execution_state,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

/// A persisted log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry identifier.
    pub id: String,
    /// Run this entry belongs to.
    pub run_id: String,
    /// Stage that logged, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the line was logged.
    pub timestamp: Timestamp,
}

impl LogEntry {
    /// Creates a new log entry stamped with the current time.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        stage: Option<&str>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            run_id: run_id.into(),
            stage: stage.map(str::to_string),
            level,
            message: message.into(),
            metadata: None,
            timestamp: now_utc(),
        }
    }

    /// Attaches structured metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
