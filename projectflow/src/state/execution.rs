//! Execution state of a project run.

use crate::core::StageOutput;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of the append-only error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Stage that failed, or the run itself for loop-level errors.
    pub stage: String,
    /// Failure reason.
    pub message: String,
    /// When the error was recorded.
    pub timestamp: Timestamp,
}

impl ExecutionError {
    /// Creates a new error entry stamped with the current time.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            timestamp: now_utc(),
        }
    }
}

/// Persisted progress record of one run.
///
/// Only the run loop mutates this. A stage appears in `completed_stages`
/// exactly when it has an entry in `stage_outputs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionState {
    /// Stage currently in flight.
    #[serde(default)]
    pub current_stage: Option<String>,
    /// Completed stages in completion order.
    #[serde(default)]
    pub completed_stages: Vec<String>,
    /// Percent complete per stage.
    #[serde(default)]
    pub stage_progress: BTreeMap<String, u8>,
    /// Outputs of completed stages.
    #[serde(default)]
    pub stage_outputs: BTreeMap<String, StageOutput>,
    /// Error log.
    #[serde(default)]
    pub errors: Vec<ExecutionError>,
}

impl ExecutionState {
    /// Creates an empty execution state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `stage` completed.
    #[must_use]
    pub fn is_completed(&self, stage: &str) -> bool {
        self.completed_stages.iter().any(|s| s == stage)
    }

    /// Returns the output of a completed stage.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&StageOutput> {
        self.stage_outputs.get(stage)
    }

    /// Marks `stage` as in flight with zero progress.
    pub fn begin_stage(&mut self, stage: &str) {
        self.current_stage = Some(stage.to_string());
        self.stage_progress.insert(stage.to_string(), 0);
    }

    /// Records a successful stage.
    ///
    /// Re-recording an already completed stage replaces its output but keeps
    /// its original position in the completion order.
    pub fn record_success(&mut self, stage: &str, output: StageOutput) {
        if !self.is_completed(stage) {
            self.completed_stages.push(stage.to_string());
        }
        self.stage_outputs.insert(stage.to_string(), output);
        self.stage_progress.insert(stage.to_string(), 100);
        self.current_stage = None;
    }

    /// Appends an error entry and clears the in-flight stage.
    pub fn record_failure(&mut self, stage: &str, message: impl Into<String>) {
        self.errors.push(ExecutionError::new(stage, message));
        self.current_stage = None;
    }

    /// Returns the most recent error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&ExecutionError> {
        self.errors.last()
    }
}
