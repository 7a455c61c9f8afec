//! Execution context handed to a stage.

use super::StageFailure;
use crate::core::{
    BackendOutput, FrontendOutput, GeneratedArtifact, LogLevel, PipelineEvent,
    RequirementsOutput, StageOutput, ValidationOutput,
};
use crate::events::EventChannel;
use crate::state::{LogEntry, ProjectConfig};
use crate::store::ProjectStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Outputs of completed predecessor stages, keyed by stage name.
///
/// Typed lookups prefer the stage's declared dependencies, in declaration
/// order, and fall back to any visible output of the right kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageInputs {
    outputs: BTreeMap<String, StageOutput>,
    dependencies: Vec<String>,
}

impl StageInputs {
    /// Creates inputs from a map of outputs.
    #[must_use]
    pub fn new(outputs: BTreeMap<String, StageOutput>) -> Self {
        Self {
            outputs,
            dependencies: Vec::new(),
        }
    }

    /// Sets the direct dependencies of the stage reading these inputs.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an output.
    #[must_use]
    pub fn with_output(mut self, stage: impl Into<String>, output: StageOutput) -> Self {
        self.outputs.insert(stage.into(), output);
        self
    }

    /// Returns the output of `stage`, if visible.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&StageOutput> {
        self.outputs.get(stage)
    }

    /// Names of visible stages.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Number of visible outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns true if no output is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    fn find<'a, T>(&'a self, pick: impl Fn(&'a StageOutput) -> Option<&'a T>) -> Option<&'a T> {
        self.dependencies
            .iter()
            .filter_map(|name| self.outputs.get(name))
            .find_map(&pick)
            .or_else(|| self.outputs.values().find_map(&pick))
    }

    /// The requirements analysis output.
    pub fn requirements(&self) -> Result<&RequirementsOutput, StageFailure> {
        self.find(StageOutput::as_requirements)
            .ok_or_else(|| StageFailure::missing_input("requirements", "requirements analysis"))
    }

    /// The frontend generation output.
    pub fn frontend(&self) -> Result<&FrontendOutput, StageFailure> {
        self.find(StageOutput::as_frontend)
            .ok_or_else(|| StageFailure::missing_input("frontend", "frontend generation"))
    }

    /// The backend generation output, possibly the skipped sentinel.
    pub fn backend(&self) -> Result<&BackendOutput, StageFailure> {
        self.find(StageOutput::as_backend)
            .ok_or_else(|| StageFailure::missing_input("backend", "backend generation"))
    }

    /// The validation output.
    pub fn validation(&self) -> Result<&ValidationOutput, StageFailure> {
        self.find(StageOutput::as_validation)
            .ok_or_else(|| StageFailure::missing_input("validation", "validation"))
    }
}

/// Side channel for a running stage: log lines and progress.
///
/// Logging persists a [`LogEntry`] (best effort) and publishes a `log`
/// event; progress is clamped to 100 and never goes backwards.
#[derive(Debug, Clone)]
pub struct StageReporter {
    run_id: String,
    stage: String,
    store: Arc<dyn ProjectStore>,
    events: EventChannel,
    progress: Arc<AtomicU8>,
}

impl StageReporter {
    /// Creates a reporter for one stage of one run.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        store: Arc<dyn ProjectStore>,
        events: EventChannel,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            stage: stage.into(),
            store,
            events,
            progress: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Logs a line.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.write(LogEntry::new(&self.run_id, Some(&self.stage), level, message))
            .await;
    }

    /// Logs a line with structured metadata.
    pub async fn log_with_metadata(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.write(
            LogEntry::new(&self.run_id, Some(&self.stage), level, message).with_metadata(metadata),
        )
        .await;
    }

    async fn write(&self, entry: LogEntry) {
        if let Err(err) = self.store.append_log(&entry).await {
            tracing::warn!(
                run_id = %self.run_id,
                stage = %self.stage,
                error = %err,
                "Failed to persist stage log entry"
            );
        }
        self.events.publish(PipelineEvent::Log {
            run_id: entry.run_id,
            stage: entry.stage,
            level: entry.level,
            message: entry.message,
            metadata: entry.metadata,
            timestamp: entry.timestamp,
        });
    }

    /// Reports progress in percent.
    pub fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.progress.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.events
                .publish(PipelineEvent::progress(&self.run_id, &self.stage, percent));
        }
    }

    /// Highest progress reported so far.
    #[must_use]
    pub fn current_progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }
}

/// Everything a stage may read while executing.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: String,
    stage: String,
    config: Arc<ProjectConfig>,
    inputs: StageInputs,
    artifacts: Arc<[GeneratedArtifact]>,
    reporter: StageReporter,
}

impl StageContext {
    /// Creates a stage context.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        config: Arc<ProjectConfig>,
        inputs: StageInputs,
        reporter: StageReporter,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            stage: stage.into(),
            config,
            inputs,
            artifacts: Arc::from(Vec::new()),
            reporter,
        }
    }

    /// Sets the snapshot of artifacts persisted before this stage started.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<GeneratedArtifact>) -> Self {
        self.artifacts = artifacts.into();
        self
    }

    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Name under which the stage is declared.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The project configuration.
    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Outputs of completed predecessors.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// Artifacts persisted for the run before this stage started.
    #[must_use]
    pub fn artifacts(&self) -> &[GeneratedArtifact] {
        &self.artifacts
    }

    /// Looks up a persisted artifact by path.
    #[must_use]
    pub fn artifact(&self, path: &str) -> Option<&GeneratedArtifact> {
        self.artifacts.iter().find(|a| a.path == path)
    }

    /// The reporter for logs and progress.
    #[must_use]
    pub fn reporter(&self) -> &StageReporter {
        &self.reporter
    }

    /// Shorthand for `reporter().log(..)`.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.reporter.log(level, message).await;
    }

    /// Shorthand for `reporter().progress(..)`.
    pub fn progress(&self, percent: u8) {
        self.reporter.progress(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;
    use crate::events::EventFilter;
    use crate::state::ProjectRun;
    use crate::store::InMemoryProjectStore;

    async fn reporter() -> (Arc<InMemoryProjectStore>, EventChannel, StageReporter) {
        let store = Arc::new(InMemoryProjectStore::new());
        store
            .create_run(&ProjectRun::with_id("run-1", ProjectConfig::new("app", "")))
            .await
            .unwrap();
        let events = EventChannel::new(32);
        let reporter = StageReporter::new("run-1", "Frontend", store.clone(), events.clone());
        (store, events, reporter)
    }

    #[test]
    fn test_typed_lookups() {
        let inputs = StageInputs::default().with_output(
            "Requirement",
            StageOutput::Requirements(RequirementsOutput {
                summary: "shop".into(),
                ..RequirementsOutput::default()
            }),
        );

        assert_eq!(inputs.requirements().unwrap().summary, "shop");
        let err = inputs.frontend().unwrap_err();
        assert!(err.message.contains("'frontend'"));
        assert!(inputs.backend().is_err());
        assert!(inputs.validation().is_err());
    }

    #[test]
    fn test_lookup_prefers_declared_dependency() {
        let frontend = |framework: &str| {
            StageOutput::Frontend(FrontendOutput {
                framework: framework.into(),
                ..FrontendOutput::default()
            })
        };
        let inputs = StageInputs::default()
            .with_output("AdminUi", frontend("svelte"))
            .with_output("Storefront", frontend("react"));

        assert_eq!(inputs.frontend().unwrap().framework, "svelte");

        let inputs = inputs.with_dependencies(["Storefront", "Backend"]);
        assert_eq!(inputs.frontend().unwrap().framework, "react");
        assert!(inputs.backend().is_err());

        let inputs = inputs.with_dependencies(["Backend"]);
        assert_eq!(inputs.frontend().unwrap().framework, "svelte");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_clamped() {
        let (_store, events, reporter) = reporter().await;
        let mut sub = events.subscribe(EventFilter::All);

        reporter.progress(30);
        reporter.progress(10);
        reporter.progress(30);
        reporter.progress(250);

        let values: Vec<u8> = sub
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![30, 100]);
        assert_eq!(reporter.current_progress(), 100);
    }

    #[tokio::test]
    async fn test_log_persists_and_publishes() {
        let (store, events, reporter) = reporter().await;
        let mut sub = events.subscribe(EventFilter::Run("run-1".into()));

        reporter.log(LogLevel::Info, "generating components").await;

        let logs = store.list_logs("run-1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].stage.as_deref(), Some("Frontend"));

        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind(), EventKind::Log);
        assert_eq!(event.stage(), Some("Frontend"));
    }

    #[tokio::test]
    async fn test_log_survives_store_failure() {
        let store = Arc::new(InMemoryProjectStore::new());
        let events = EventChannel::new(8);
        let mut sub = events.subscribe(EventFilter::All);
        let reporter = StageReporter::new("missing-run", "Backend", store, events.clone());

        reporter.log(LogLevel::Warn, "still published").await;

        assert_eq!(sub.try_recv().unwrap().kind(), EventKind::Log);
    }
}
