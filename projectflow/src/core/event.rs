//! Pipeline events published on the event channel.

use super::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`PipelineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A log line.
    Log,
    /// A stage progress update.
    Progress,
    /// A stage was selected and is about to execute.
    StageStarted,
    /// A stage completed successfully.
    StageCompleted,
    /// A stage failed.
    StageError,
    /// A run was started.
    RunStarted,
    /// A run was paused.
    RunPaused,
    /// A run was resumed.
    RunResumed,
    /// A run completed.
    RunCompleted,
    /// A run ended in error.
    RunError,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Log => "log",
            Self::Progress => "progress",
            Self::StageStarted => "stage-started",
            Self::StageCompleted => "stage-completed",
            Self::StageError => "stage-error",
            Self::RunStarted => "run-started",
            Self::RunPaused => "run-paused",
            Self::RunResumed => "run-resumed",
            Self::RunCompleted => "run-completed",
            Self::RunError => "run-error",
        };
        f.write_str(name)
    }
}

/// An event announced by the orchestrator or a stage.
///
/// Every event carries the run identifier so listeners can filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineEvent {
    /// A log line, mirrored from the persisted log entry.
    Log {
        /// Run identifier.
        run_id: String,
        /// Stage that logged, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
        /// Optional structured payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
        /// When the line was logged.
        timestamp: DateTime<Utc>,
    },
    /// Stage progress in percent.
    Progress {
        /// Run identifier.
        run_id: String,
        /// Stage reporting progress.
        stage: String,
        /// Percent, 0 to 100.
        progress: u8,
        /// When the update was made.
        timestamp: DateTime<Utc>,
    },
    /// A stage started executing.
    StageStarted {
        /// Run identifier.
        run_id: String,
        /// Stage name.
        stage: String,
        /// When the stage started.
        timestamp: DateTime<Utc>,
    },
    /// A stage completed successfully.
    StageCompleted {
        /// Run identifier.
        run_id: String,
        /// Stage name.
        stage: String,
        /// Wall-clock duration of the stage.
        duration_ms: u64,
        /// Number of artifacts persisted.
        artifact_count: usize,
        /// True when the stage returned the skipped sentinel.
        skipped: bool,
        /// When the stage completed.
        timestamp: DateTime<Utc>,
    },
    /// A stage failed.
    StageError {
        /// Run identifier.
        run_id: String,
        /// Stage name.
        stage: String,
        /// Failure reason.
        error: String,
        /// When the failure was recorded.
        timestamp: DateTime<Utc>,
    },
    /// A run was started.
    RunStarted {
        /// Run identifier.
        run_id: String,
        /// When the run started.
        timestamp: DateTime<Utc>,
    },
    /// A run was paused.
    RunPaused {
        /// Run identifier.
        run_id: String,
        /// When the pause was requested.
        timestamp: DateTime<Utc>,
    },
    /// A run was resumed.
    RunResumed {
        /// Run identifier.
        run_id: String,
        /// Stages already completed at resume time.
        completed_stages: Vec<String>,
        /// When the run resumed.
        timestamp: DateTime<Utc>,
    },
    /// A run completed.
    RunCompleted {
        /// Run identifier.
        run_id: String,
        /// Completion order of the stages.
        completed_stages: Vec<String>,
        /// When the run completed.
        timestamp: DateTime<Utc>,
    },
    /// A run ended in error.
    RunError {
        /// Run identifier.
        run_id: String,
        /// Failing stage, when a stage caused the error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        /// Failure reason.
        error: String,
        /// When the error was recorded.
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        match self {
            Self::Log { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::StageError { run_id, .. }
            | Self::RunStarted { run_id, .. }
            | Self::RunPaused { run_id, .. }
            | Self::RunResumed { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunError { run_id, .. } => run_id,
        }
    }

    /// Returns the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Log { .. } => EventKind::Log,
            Self::Progress { .. } => EventKind::Progress,
            Self::StageStarted { .. } => EventKind::StageStarted,
            Self::StageCompleted { .. } => EventKind::StageCompleted,
            Self::StageError { .. } => EventKind::StageError,
            Self::RunStarted { .. } => EventKind::RunStarted,
            Self::RunPaused { .. } => EventKind::RunPaused,
            Self::RunResumed { .. } => EventKind::RunResumed,
            Self::RunCompleted { .. } => EventKind::RunCompleted,
            Self::RunError { .. } => EventKind::RunError,
        }
    }

    /// Returns the stage name for stage-scoped events.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Progress { stage, .. }
            | Self::StageStarted { stage, .. }
            | Self::StageCompleted { stage, .. }
            | Self::StageError { stage, .. } => Some(stage),
            Self::Log { stage, .. } | Self::RunError { stage, .. } => stage.as_deref(),
            _ => None,
        }
    }

    /// Creates a "run-started" event.
    #[must_use]
    pub fn run_started(run_id: &str) -> Self {
        Self::RunStarted {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a "run-paused" event.
    #[must_use]
    pub fn run_paused(run_id: &str) -> Self {
        Self::RunPaused {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a "run-resumed" event.
    #[must_use]
    pub fn run_resumed(run_id: &str, completed_stages: &[String]) -> Self {
        Self::RunResumed {
            run_id: run_id.to_string(),
            completed_stages: completed_stages.to_vec(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a "run-completed" event.
    #[must_use]
    pub fn run_completed(run_id: &str, completed_stages: &[String]) -> Self {
        Self::RunCompleted {
            run_id: run_id.to_string(),
            completed_stages: completed_stages.to_vec(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a "run-error" event.
    #[must_use]
    pub fn run_error(run_id: &str, stage: Option<&str>, error: &str) -> Self {
        Self::RunError {
            run_id: run_id.to_string(),
            stage: stage.map(str::to_string),
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a "stage-started" event.
    #[must_use]
    pub fn stage_started(run_id: &str, stage: &str) -> Self {
        Self::StageStarted {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a "stage-completed" event.
    #[must_use]
    pub fn stage_completed(
        run_id: &str,
        stage: &str,
        duration_ms: u64,
        artifact_count: usize,
        skipped: bool,
    ) -> Self {
        Self::StageCompleted {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            duration_ms,
            artifact_count,
            skipped,
            timestamp: Utc::now(),
        }
    }

    /// Creates a "stage-error" event.
    #[must_use]
    pub fn stage_error(run_id: &str, stage: &str, error: &str) -> Self {
        Self::StageError {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a "progress" event.
    #[must_use]
    pub fn progress(run_id: &str, stage: &str, progress: u8) -> Self {
        Self::Progress {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            progress,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_run_id() {
        let event = PipelineEvent::stage_started("run-1", "Frontend");
        assert_eq!(event.kind(), EventKind::StageStarted);
        assert_eq!(event.run_id(), "run-1");
        assert_eq!(event.stage(), Some("Frontend"));
    }

    #[test]
    fn test_run_events_have_no_stage() {
        assert_eq!(PipelineEvent::run_started("r").stage(), None);
        assert_eq!(PipelineEvent::run_paused("r").stage(), None);
        assert_eq!(
            PipelineEvent::run_error("r", Some("Backend"), "boom").stage(),
            Some("Backend")
        );
    }

    #[test]
    fn test_event_kind_display_matches_serde() {
        let kinds = [
            EventKind::Log,
            EventKind::Progress,
            EventKind::StageStarted,
            EventKind::StageCompleted,
            EventKind::StageError,
            EventKind::RunStarted,
            EventKind::RunPaused,
            EventKind::RunResumed,
            EventKind::RunCompleted,
            EventKind::RunError,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PipelineEvent::stage_completed("run-9", "Backend", 12, 0, true);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "stage-completed");
        assert_eq!(json["run_id"], "run-9");
        assert_eq!(json["skipped"], true);

        let back: PipelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
