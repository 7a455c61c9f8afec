//! Stage result types.

use crate::core::{GeneratedArtifact, StageOutput};
use crate::errors::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a stage returns: success with output and artifacts, or a reason.
pub type StageResult = Result<StageSuccess, StageFailure>;

/// A successful stage execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSuccess {
    /// Structured output consumed by dependent stages.
    pub output: StageOutput,
    /// Files to persist for the run.
    #[serde(default)]
    pub artifacts: Vec<GeneratedArtifact>,
}

impl StageSuccess {
    /// Creates a success without artifacts.
    #[must_use]
    pub fn new(output: StageOutput) -> Self {
        Self {
            output,
            artifacts: Vec::new(),
        }
    }

    /// Sets the artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<GeneratedArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Adds one artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: GeneratedArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// A failed stage execution. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Human-readable reason.
    pub message: String,
}

impl StageFailure {
    /// Creates a failure.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Failure for a predecessor output that is absent from the inputs.
    #[must_use]
    pub fn missing_input(kind: &str, producer: &str) -> Self {
        Self::new(format!(
            "missing required input '{kind}': the {producer} stage has not completed"
        ))
    }

    /// Failure wrapping a generation backend error.
    #[must_use]
    pub fn backend(action: &str, err: &BackendError) -> Self {
        Self::new(format!("{action} failed: {err}"))
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StageFailure {}

impl From<String> for StageFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for StageFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
