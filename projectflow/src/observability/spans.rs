//! Span metadata for run loops and stage executions.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::Span;

/// Span attributes for one run-loop invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpanAttributes {
    /// Pipeline name.
    pub pipeline_name: String,
    /// Run identifier.
    pub run_id: String,
    /// Project name from the run configuration.
    pub project_name: Option<String>,
    /// True when the loop was entered through resume.
    pub resumed: bool,
}

impl PipelineSpanAttributes {
    /// Creates pipeline span attributes.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    /// Sets the project name.
    #[must_use]
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Marks the loop as resumed.
    #[must_use]
    pub fn resumed(mut self, resumed: bool) -> Self {
        self.resumed = resumed;
        self
    }

    /// Creates the `tracing` span for the run loop.
    #[must_use]
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "pipeline_run",
            pipeline = %self.pipeline_name,
            run_id = %self.run_id,
            project = self.project_name.as_deref().unwrap_or(""),
            resumed = self.resumed,
        )
    }
}

/// Span attributes for one stage execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage_name: String,
    /// `completed`, `skipped` or `failed`.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Number of artifacts returned.
    pub artifact_count: usize,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates stage span attributes.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            ..Default::default()
        }
    }

    /// Sets the stage status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the artifact count.
    #[must_use]
    pub fn with_artifact_count(mut self, count: usize) -> Self {
        self.artifact_count = count;
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Emits the finished stage as a single `tracing` event.
    pub fn record(&self) {
        let status = self.status.as_deref().unwrap_or("unknown");
        let duration_ms = self.duration_ms.unwrap_or_default();
        match &self.error {
            Some(error) => tracing::warn!(
                stage = %self.stage_name,
                status,
                duration_ms,
                error = %error,
                "Stage finished"
            ),
            None => tracing::info!(
                stage = %self.stage_name,
                status,
                duration_ms,
                artifact_count = self.artifact_count,
                "Stage finished"
            ),
        }
    }
}

/// Wall-clock timer for a run loop or a stage execution.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stops the timer and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_attributes() {
        let attrs = PipelineSpanAttributes::new("standard", "run-1")
            .with_project_name("todo")
            .resumed(true);

        assert_eq!(attrs.run_id, "run-1");
        assert_eq!(attrs.project_name.as_deref(), Some("todo"));
        assert!(attrs.resumed);
        let _entered = attrs.span().entered();
    }

    #[test]
    fn test_stage_attributes() {
        let attrs = StageSpanAttributes::new("Frontend")
            .with_status("failed")
            .with_duration_ms(12.5)
            .with_error("boom");

        assert_eq!(attrs.status.as_deref(), Some("failed"));
        assert_eq!(attrs.duration_ms, Some(12.5));
        assert_eq!(attrs.error.as_deref(), Some("boom"));
        assert_eq!(attrs.artifact_count, 0);
        attrs.record();
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start();
        let first = timer.elapsed_ms();
        assert!(first >= 0.0);
        assert!(timer.finish() >= first);
    }
}
