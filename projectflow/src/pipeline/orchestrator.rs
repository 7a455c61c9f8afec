//! Run lifecycle and the stage loop.
//!
//! The orchestrator owns no run state of its own. Each loop iteration
//! reads the persisted completed-stage list, selects the next stage and
//! persists every transition before announcing it, so any run can be
//! resumed from the store alone.

use super::control::{RunControl, RunHandle, RunOutcome};
use super::{Pipeline, Selection};
use crate::config::OrchestratorConfig;
use crate::core::{GeneratedArtifact, LogLevel, PipelineEvent, RunStatus};
use crate::errors::{DependencyInconsistencyError, ProjectflowError, StoreError};
use crate::events::{EventChannel, EventFilter, EventSubscription};
use crate::observability::{PipelineSpanAttributes, SpanTimer, StageSpanAttributes};
use crate::stages::{
    StageContext, StageFailure, StageInputs, StageReporter, StageResult, StageSuccess,
};
use crate::state::{ExecutionState, LogEntry, ProjectConfig, ProjectRun, RunSnapshot};
use crate::store::ProjectStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Stage name recorded when no stage can be selected.
pub const PIPELINE_ERROR_STAGE: &str = "pipeline";

/// Statuses `pause` moves a run out of.
const PAUSABLE: &[RunStatus] = &[RunStatus::Pending, RunStatus::Running];
/// Statuses a fresh loop can be resumed from.
const RESUMABLE: &[RunStatus] = &[
    RunStatus::Pending,
    RunStatus::Running,
    RunStatus::Paused,
    RunStatus::Error,
];
/// Statuses the run loop finishes a run from. A pause that lands after
/// the last stage does not hold back completion.
const LOOP_STATUSES: &[RunStatus] = &[RunStatus::Running, RunStatus::Paused];

/// Drives runs of one [`Pipeline`] against a [`ProjectStore`].
///
/// Cheap to clone; clones share the active-run table, so a run started
/// through one clone can be paused through another.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    pipeline: Arc<Pipeline>,
    store: Arc<dyn ProjectStore>,
    events: EventChannel,
    config: OrchestratorConfig,
    active: DashMap<String, Arc<RunControl>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipeline", &self.inner.pipeline.name())
            .field("store", &self.inner.store)
            .field("active_runs", &self.inner.active.len())
            .finish_non_exhaustive()
    }
}

/// A transition write that failed, with the stage it belonged to.
#[derive(Debug)]
struct TransitionError {
    stage: Option<String>,
    source: StoreError,
}

impl TransitionError {
    fn new(stage: Option<&str>, source: StoreError) -> Self {
        Self {
            stage: stage.map(str::to_string),
            source,
        }
    }
}

type Step = Result<Option<RunOutcome>, TransitionError>;

impl Orchestrator {
    /// Creates an orchestrator with default configuration.
    #[must_use]
    pub fn new(pipeline: Pipeline, store: Arc<dyn ProjectStore>, events: EventChannel) -> Self {
        Self::with_config(pipeline, store, events, OrchestratorConfig::default())
    }

    /// Creates an orchestrator with explicit configuration.
    #[must_use]
    pub fn with_config(
        pipeline: Pipeline,
        store: Arc<dyn ProjectStore>,
        events: EventChannel,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline: Arc::new(pipeline),
                store,
                events,
                config,
                active: DashMap::new(),
            }),
        }
    }

    /// The pipeline this orchestrator runs.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// The event channel runs publish to.
    #[must_use]
    pub fn events(&self) -> &EventChannel {
        &self.inner.events
    }

    /// The orchestrator configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Subscribes to live events.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.inner.events.subscribe(filter)
    }

    /// Returns true while a loop is attached to `run_id`.
    #[must_use]
    pub fn is_active(&self, run_id: &str) -> bool {
        self.inner.active.contains_key(run_id)
    }

    /// Persists a new pending run.
    ///
    /// # Errors
    ///
    /// Returns a store error if the run cannot be written.
    pub async fn create_run(&self, config: ProjectConfig) -> Result<RunSnapshot, ProjectflowError> {
        let run = ProjectRun::new(config);
        self.inner.store.create_run(&run).await?;
        info!(run_id = %run.id, project = %run.config.name, "Run created");
        Ok(run.snapshot())
    }

    /// Current persisted view of a run.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectflowError::RunNotFound`] for unknown runs.
    pub async fn snapshot(&self, run_id: &str) -> Result<RunSnapshot, ProjectflowError> {
        Ok(self.inner.load(run_id).await?.snapshot())
    }

    /// Every persisted run, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the runs cannot be read.
    pub async fn list_runs(&self) -> Result<Vec<RunSnapshot>, ProjectflowError> {
        let runs = self.inner.store.list_runs().await?;
        Ok(runs.iter().map(ProjectRun::snapshot).collect())
    }

    /// Log entries of a run in append order.
    ///
    /// # Errors
    ///
    /// Returns a store error if the log cannot be read.
    pub async fn logs(&self, run_id: &str) -> Result<Vec<LogEntry>, ProjectflowError> {
        Ok(self.inner.store.list_logs(run_id).await?)
    }

    /// Artifacts of a run, one per path.
    ///
    /// # Errors
    ///
    /// Returns a store error if the artifacts cannot be read.
    pub async fn artifacts(&self, run_id: &str) -> Result<Vec<GeneratedArtifact>, ProjectflowError> {
        Ok(self.inner.store.list_artifacts(run_id).await?)
    }

    /// Starts a pending run in the background.
    ///
    /// # Errors
    ///
    /// Fails if the run is unknown, not pending, already attached to a
    /// loop, or the running status cannot be persisted.
    pub async fn start(&self, run_id: &str) -> Result<RunHandle, ProjectflowError> {
        let mut run = self.inner.load(run_id).await?;
        if run.status != RunStatus::Pending {
            return Err(invalid_transition(run_id, run.status, "start"));
        }

        let control = self.inner.reserve(run_id)?;
        let state = ExecutionState::new();
        if let Err(err) = self
            .inner
            .enter_running(run_id, &[RunStatus::Pending], Some(&state))
            .await
        {
            self.inner.release(run_id, &control);
            return Err(transition_refused(run_id, err, "start"));
        }
        run.execution_state = state;
        run.status = RunStatus::Running;

        self.inner.events.publish(PipelineEvent::run_started(run_id));
        self.inner
            .lifecycle_log(run_id, LogLevel::Info, "Run started")
            .await;
        info!(run_id, pipeline = %self.inner.pipeline.name(), "Run started");

        Ok(self.spawn_loop(run, control, false))
    }

    /// Requests a pause.
    ///
    /// The status flips to paused at once. A stage already executing
    /// finishes and is recorded; the loop then stops before selecting the
    /// next one. Pausing a paused run is a no-op.
    ///
    /// # Errors
    ///
    /// Fails for unknown runs and for completed or failed runs, including
    /// a run that reached its terminal status while the pause was in
    /// flight.
    pub async fn pause(&self, run_id: &str) -> Result<RunSnapshot, ProjectflowError> {
        let mut run = self.inner.load(run_id).await?;
        match run.status {
            RunStatus::Paused => return Ok(run.snapshot()),
            status if status.is_pausable() => {}
            status => return Err(invalid_transition(run_id, status, "pause")),
        }

        match self
            .inner
            .store
            .transition_status(run_id, PAUSABLE, RunStatus::Paused)
            .await
        {
            Ok(_) => {}
            Err(StoreError::StatusConflict {
                current: RunStatus::Paused,
                ..
            }) => {
                run.status = RunStatus::Paused;
                return Ok(run.snapshot());
            }
            Err(err) => return Err(transition_refused(run_id, err, "pause")),
        }
        if let Some(control) = self.inner.active.get(run_id) {
            control.request_pause();
        }
        run.status = RunStatus::Paused;

        self.inner.events.publish(PipelineEvent::run_paused(run_id));
        self.inner
            .lifecycle_log(run_id, LogLevel::Info, "Run paused")
            .await;
        info!(run_id, "Run paused");

        Ok(run.snapshot())
    }

    /// Resumes a run from its persisted completed stages.
    ///
    /// Completed runs are left untouched; the call only re-announces
    /// completion. A paused run whose loop is still finishing its
    /// in-flight stage is re-attached to that loop instead of starting a
    /// second one; if that loop finishes the run first, the returned handle
    /// reports its outcome. Failed runs retry the stage that failed.
    ///
    /// # Errors
    ///
    /// Fails for unknown runs, for runs whose loop is running unpaused,
    /// or if the running status cannot be persisted.
    pub async fn resume(&self, run_id: &str) -> Result<RunHandle, ProjectflowError> {
        let mut run = self.inner.load(run_id).await?;
        let completed = run.execution_state.completed_stages.clone();

        if run.status == RunStatus::Completed {
            self.inner
                .events
                .publish(PipelineEvent::run_completed(run_id, &completed));
            info!(run_id, "Resume requested for a completed run");
            return Ok(RunHandle::finished(run_id, RunOutcome::Completed));
        }

        let attached = match self.inner.active.get(run_id) {
            Some(control) if control.take_pause() => Some(Arc::clone(control.value())),
            Some(_) => return Err(ProjectflowError::RunAlreadyActive(run_id.to_string())),
            None => None,
        };

        if let Some(control) = attached {
            match self
                .inner
                .enter_running(run_id, &[RunStatus::Paused], None)
                .await
            {
                Ok(_) => self.announce_resume(run_id, &completed).await,
                Err(StoreError::StatusConflict { current, .. }) => {
                    info!(run_id, status = %current, "Re-attached loop already left the paused state");
                }
                Err(err) => {
                    control.request_pause();
                    return Err(transition_refused(run_id, err, "resume"));
                }
            }
            return Ok(control.handle(run_id));
        }

        let control = self.inner.reserve(run_id)?;
        if let Err(err) = self.inner.enter_running(run_id, RESUMABLE, None).await {
            self.inner.release(run_id, &control);
            return Err(transition_refused(run_id, err, "resume"));
        }
        run.status = RunStatus::Running;
        self.announce_resume(run_id, &completed).await;

        Ok(self.spawn_loop(run, control, true))
    }

    async fn announce_resume(&self, run_id: &str, completed: &[String]) {
        self.inner
            .events
            .publish(PipelineEvent::run_resumed(run_id, completed));
        self.inner
            .lifecycle_log(
                run_id,
                LogLevel::Info,
                format!("Run resumed with {} completed stages", completed.len()),
            )
            .await;
        info!(run_id, completed = completed.len(), "Run resumed");
    }

    fn spawn_loop(&self, run: ProjectRun, control: Arc<RunControl>, resumed: bool) -> RunHandle {
        let handle = control.handle(&run.id);
        let span = PipelineSpanAttributes::new(self.inner.pipeline.name(), &run.id)
            .with_project_name(&run.config.name)
            .resumed(resumed)
            .span();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(
            async move {
                let run_id = run.id.clone();
                let outcome = inner.run_loop(run, &control).await;
                inner.release(&run_id, &control);
                control.finish(outcome);
            }
            .instrument(span),
        );

        handle
    }
}

impl Inner {
    async fn load(&self, run_id: &str) -> Result<ProjectRun, ProjectflowError> {
        match self.store.get_run(run_id).await {
            Ok(run) => Ok(run),
            Err(StoreError::NotFound(_)) => Err(ProjectflowError::RunNotFound(run_id.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    fn reserve(&self, run_id: &str) -> Result<Arc<RunControl>, ProjectflowError> {
        match self.active.entry(run_id.to_string()) {
            Entry::Occupied(_) => Err(ProjectflowError::RunAlreadyActive(run_id.to_string())),
            Entry::Vacant(slot) => {
                let control = RunControl::new();
                slot.insert(Arc::clone(&control));
                Ok(control)
            }
        }
    }

    fn release(&self, run_id: &str, control: &Arc<RunControl>) {
        self.active
            .remove_if(run_id, |_, current| Arc::ptr_eq(current, control));
    }

    async fn enter_running(
        &self,
        run_id: &str,
        allowed_from: &[RunStatus],
        state: Option<&ExecutionState>,
    ) -> Result<RunStatus, StoreError> {
        if let Some(state) = state {
            self.store.replace_state(run_id, state).await?;
        }
        self.store
            .transition_status(run_id, allowed_from, RunStatus::Running)
            .await
    }

    /// Detaches the loop if a pause is pending.
    ///
    /// Runs under the map's shard lock so a concurrent resume either sees
    /// the control and clears the request first, or finds no loop and
    /// starts a fresh one.
    fn should_halt(&self, run_id: &str, control: &Arc<RunControl>) -> bool {
        control.pause_requested()
            && self
                .active
                .remove_if(run_id, |_, current| {
                    Arc::ptr_eq(current, control) && current.pause_requested()
                })
                .is_some()
    }

    async fn run_loop(&self, mut run: ProjectRun, control: &Arc<RunControl>) -> RunOutcome {
        let config = Arc::new(run.config.clone());
        let timer = SpanTimer::start();

        loop {
            if self.should_halt(&run.id, control) {
                info!(
                    run_id = %run.id,
                    completed = run.execution_state.completed_stages.len(),
                    "Run loop halted at stage boundary"
                );
                return RunOutcome::Paused;
            }

            let step = match self.pipeline.select_next(&run.execution_state.completed_stages) {
                Selection::AllComplete => self.complete(&mut run).await,
                Selection::Blocked { remaining } => self.block(&mut run, remaining).await,
                Selection::Ready(stage) => self.run_stage(&mut run, &config, &stage).await,
            };

            match step {
                Ok(None) => {}
                Ok(Some(outcome)) => {
                    info!(run_id = %run.id, elapsed_ms = timer.elapsed_ms(), ?outcome, "Run loop finished");
                    return outcome;
                }
                Err(err) => return self.abort(&run.id, err),
            }
        }
    }

    async fn complete(&self, run: &mut ProjectRun) -> Step {
        self.store
            .transition_status(&run.id, LOOP_STATUSES, RunStatus::Completed)
            .await
            .map_err(|err| TransitionError::new(None, err))?;
        run.status = RunStatus::Completed;

        let completed = &run.execution_state.completed_stages;
        self.events
            .publish(PipelineEvent::run_completed(&run.id, completed));
        self.lifecycle_log(&run.id, LogLevel::Success, "Run completed")
            .await;
        info!(run_id = %run.id, stages = completed.len(), "Run completed");

        Ok(Some(RunOutcome::Completed))
    }

    async fn block(&self, run: &mut ProjectRun, remaining: Vec<String>) -> Step {
        let message = DependencyInconsistencyError::new(remaining).to_string();
        let fail = |err| TransitionError::new(Some(PIPELINE_ERROR_STAGE), err);

        let mut next = run.execution_state.clone();
        next.record_failure(PIPELINE_ERROR_STAGE, message.clone());
        self.store.replace_state(&run.id, &next).await.map_err(fail)?;
        run.execution_state = next;
        self.store
            .transition_status(&run.id, LOOP_STATUSES, RunStatus::Error)
            .await
            .map_err(fail)?;
        run.status = RunStatus::Error;

        self.events
            .publish(PipelineEvent::run_error(&run.id, None, &message));
        self.lifecycle_log(&run.id, LogLevel::Error, message.clone())
            .await;
        error!(run_id = %run.id, error = %message, "No stage can be selected");

        Ok(Some(RunOutcome::Failed {
            stage: PIPELINE_ERROR_STAGE.to_string(),
            message,
        }))
    }

    async fn run_stage(&self, run: &mut ProjectRun, config: &Arc<ProjectConfig>, stage: &str) -> Step {
        let run_id = run.id.clone();
        let fail = |err| TransitionError::new(Some(stage), err);

        let mut next = run.execution_state.clone();
        next.begin_stage(stage);
        self.store.replace_state(&run_id, &next).await.map_err(fail)?;
        run.execution_state = next;

        self.events
            .publish(PipelineEvent::stage_started(&run_id, stage));
        self.stage_log(&run_id, stage, LogLevel::Info, format!("Starting stage {stage}"))
            .await;
        info!(run_id = %run_id, stage, "Stage started");

        let artifacts = self.store.list_artifacts(&run_id).await.map_err(fail)?;
        let reporter = StageReporter::new(&run_id, stage, Arc::clone(&self.store), self.events.clone());
        let ctx = StageContext::new(
            &run_id,
            stage,
            Arc::clone(config),
            self.inputs_for(&run.execution_state, stage),
            reporter.clone(),
        )
        .with_artifacts(artifacts);

        let timer = SpanTimer::start();
        let result = self.execute(stage, ctx).await;
        let duration_ms = timer.finish();

        match result {
            Ok(success) => self
                .record_success(run, stage, success, &reporter, duration_ms)
                .await
                .map_err(fail),
            Err(failure) => self
                .record_failure(run, stage, &failure, duration_ms)
                .await
                .map_err(fail),
        }
    }

    /// Outputs visible to `stage`, looked up through its declared
    /// dependencies first.
    fn inputs_for(&self, state: &ExecutionState, stage: &str) -> StageInputs {
        let dependencies = self
            .pipeline
            .declaration(stage)
            .map(|decl| decl.dependencies.clone())
            .unwrap_or_default();
        let outputs = if self.config.strict_inputs {
            let visible = self.pipeline.transitive_dependencies(stage);
            state
                .stage_outputs
                .iter()
                .filter(|(name, _)| visible.contains(*name))
                .map(|(name, output)| (name.clone(), output.clone()))
                .collect()
        } else {
            state.stage_outputs.clone()
        };
        StageInputs::new(outputs).with_dependencies(dependencies)
    }

    /// Runs the stage on its own task so a panic becomes a failure.
    async fn execute(&self, stage: &str, ctx: StageContext) -> StageResult {
        let Some(runner) = self.pipeline.runner(stage) else {
            return Err(StageFailure::new(format!(
                "no implementation registered for stage '{stage}'"
            )));
        };

        let task = tokio::spawn(async move { runner.execute(&ctx).await }.in_current_span());
        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(StageFailure::new(format!(
                "stage panicked: {}",
                panic_message(&*err.into_panic())
            ))),
            Err(_) => Err(StageFailure::new("stage task was cancelled")),
        }
    }

    async fn record_success(
        &self,
        run: &mut ProjectRun,
        stage: &str,
        success: StageSuccess,
        reporter: &StageReporter,
        duration_ms: f64,
    ) -> Result<Option<RunOutcome>, StoreError> {
        let StageSuccess { output, artifacts } = success;
        for artifact in &artifacts {
            self.store.upsert_artifact(&run.id, artifact).await?;
        }

        let skipped = output.is_skipped();
        let mut next = run.execution_state.clone();
        next.record_success(stage, output);
        self.store.replace_state(&run.id, &next).await?;
        run.execution_state = next;

        reporter.progress(100);
        self.events.publish(PipelineEvent::stage_completed(
            &run.id,
            stage,
            whole_millis(duration_ms),
            artifacts.len(),
            skipped,
        ));
        let message = if skipped {
            format!("Stage {stage} skipped")
        } else {
            format!("Stage {stage} completed with {} artifacts", artifacts.len())
        };
        self.stage_log(&run.id, stage, LogLevel::Success, message).await;
        StageSpanAttributes::new(stage)
            .with_status(if skipped { "skipped" } else { "completed" })
            .with_duration_ms(duration_ms)
            .with_artifact_count(artifacts.len())
            .record();

        Ok(None)
    }

    async fn record_failure(
        &self,
        run: &mut ProjectRun,
        stage: &str,
        failure: &StageFailure,
        duration_ms: f64,
    ) -> Result<Option<RunOutcome>, StoreError> {
        let mut next = run.execution_state.clone();
        next.record_failure(stage, failure.message.clone());
        self.store.replace_state(&run.id, &next).await?;
        run.execution_state = next;
        self.store
            .transition_status(&run.id, LOOP_STATUSES, RunStatus::Error)
            .await?;
        run.status = RunStatus::Error;

        self.events
            .publish(PipelineEvent::stage_error(&run.id, stage, &failure.message));
        self.events
            .publish(PipelineEvent::run_error(&run.id, Some(stage), &failure.message));
        self.stage_log(&run.id, stage, LogLevel::Error, format!("Stage {stage} failed: {failure}"))
            .await;
        StageSpanAttributes::new(stage)
            .with_status("failed")
            .with_duration_ms(duration_ms)
            .with_error(&failure.message)
            .record();

        Ok(Some(RunOutcome::Failed {
            stage: stage.to_string(),
            message: failure.message.clone(),
        }))
    }

    /// Gives up on a run whose transition could not be written.
    ///
    /// The stored status is left as it was; nothing here writes to the
    /// store.
    fn abort(&self, run_id: &str, err: TransitionError) -> RunOutcome {
        let reason = match &err.stage {
            Some(stage) => format!("failed to persist transition for stage {stage}: {}", err.source),
            None => format!("failed to persist run transition: {}", err.source),
        };
        error!(run_id, stage = ?err.stage, error = %err.source, "Run loop aborted");
        self.events
            .publish(PipelineEvent::run_error(run_id, err.stage.as_deref(), &reason));
        RunOutcome::Aborted { reason }
    }

    async fn lifecycle_log(&self, run_id: &str, level: LogLevel, message: impl Into<String>) {
        self.write_log(LogEntry::new(run_id, None, level, message)).await;
    }

    async fn stage_log(&self, run_id: &str, stage: &str, level: LogLevel, message: impl Into<String>) {
        self.write_log(LogEntry::new(run_id, Some(stage), level, message))
            .await;
    }

    async fn write_log(&self, entry: LogEntry) {
        if let Err(err) = self.store.append_log(&entry).await {
            warn!(run_id = %entry.run_id, error = %err, "Failed to persist log entry");
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
}

fn invalid_transition(run_id: &str, from: RunStatus, operation: &'static str) -> ProjectflowError {
    ProjectflowError::InvalidTransition {
        run_id: run_id.to_string(),
        from,
        operation,
    }
}

/// Maps a refused status write to the error the caller reports.
fn transition_refused(run_id: &str, err: StoreError, operation: &'static str) -> ProjectflowError {
    match err {
        StoreError::StatusConflict { current, .. } => invalid_transition(run_id, current, operation),
        StoreError::NotFound(_) => ProjectflowError::RunNotFound(run_id.to_string()),
        err => err.into(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_millis(duration_ms: f64) -> u64 {
    duration_ms.max(0.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;
    use crate::events::{CollectingEventSink, EventSink};
    use crate::pipeline::PipelineBuilder;
    use crate::store::InMemoryProjectStore;
    use crate::testing::{FailingStage, MockStage};
    use pretty_assertions::assert_eq;

    fn chain() -> Pipeline {
        PipelineBuilder::new("chain")
            .stage(Arc::new(MockStage::new("a")), &[])
            .stage(Arc::new(MockStage::new("b")), &["a"])
            .build()
            .unwrap()
    }

    fn orchestrator(pipeline: Pipeline) -> (Orchestrator, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let events = EventChannel::with_sinks(64, vec![sink.clone() as Arc<dyn EventSink>]);
        let store = Arc::new(InMemoryProjectStore::new());
        (Orchestrator::new(pipeline, store, events), sink)
    }

    #[tokio::test]
    async fn test_start_runs_to_completion() {
        let (orch, sink) = orchestrator(chain());
        let run = orch.create_run(ProjectConfig::new("demo", "")).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        let outcome = orch.start(&run.id).await.unwrap().wait().await;
        assert_eq!(outcome, RunOutcome::Completed);

        let snapshot = orch.snapshot(&run.id).await.unwrap();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.execution_state.completed_stages, vec!["a", "b"]);
        assert!(!orch.is_active(&run.id));

        let kinds: Vec<EventKind> = sink
            .kinds()
            .into_iter()
            .filter(|k| *k != EventKind::Log && *k != EventKind::Progress)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::RunStarted,
                EventKind::StageStarted,
                EventKind::StageCompleted,
                EventKind::StageStarted,
                EventKind::StageCompleted,
                EventKind::RunCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_start_requires_pending() {
        let (orch, _) = orchestrator(chain());
        let run = orch.create_run(ProjectConfig::new("demo", "")).await.unwrap();
        orch.start(&run.id).await.unwrap().wait().await;

        let err = orch.start(&run.id).await.unwrap_err();
        assert!(matches!(
            err,
            ProjectflowError::InvalidTransition {
                from: RunStatus::Completed,
                operation: "start",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let (orch, _) = orchestrator(chain());
        assert!(matches!(
            orch.start("missing").await.unwrap_err(),
            ProjectflowError::RunNotFound(_)
        ));
        assert!(matches!(
            orch.pause("missing").await.unwrap_err(),
            ProjectflowError::RunNotFound(_)
        ));
        assert!(matches!(
            orch.resume("missing").await.unwrap_err(),
            ProjectflowError::RunNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let pipeline = PipelineBuilder::new("failing")
            .stage(Arc::new(MockStage::new("a")), &[])
            .stage(Arc::new(FailingStage::new("b", "boom")), &["a"])
            .stage(Arc::new(MockStage::new("c")), &["b"])
            .build()
            .unwrap();
        let (orch, sink) = orchestrator(pipeline);
        let run = orch.create_run(ProjectConfig::new("demo", "")).await.unwrap();

        let outcome = orch.start(&run.id).await.unwrap().wait().await;
        assert_eq!(
            outcome,
            RunOutcome::Failed {
                stage: "b".into(),
                message: "boom".into()
            }
        );

        let snapshot = orch.snapshot(&run.id).await.unwrap();
        assert_eq!(snapshot.status, RunStatus::Error);
        assert_eq!(snapshot.execution_state.completed_stages, vec!["a"]);
        assert_eq!(snapshot.execution_state.last_error().unwrap().stage, "b");
        assert!(sink.events_of_kind(EventKind::StageError).len() == 1);
        assert!(sink.events_of_kind(EventKind::RunError).len() == 1);
    }

    #[tokio::test]
    async fn test_pause_before_start() {
        let (orch, _) = orchestrator(chain());
        let run = orch.create_run(ProjectConfig::new("demo", "")).await.unwrap();

        let paused = orch.pause(&run.id).await.unwrap();
        assert_eq!(paused.status, RunStatus::Paused);
        // A second pause is a no-op.
        assert_eq!(orch.pause(&run.id).await.unwrap().status, RunStatus::Paused);

        let outcome = orch.resume(&run.id).await.unwrap().wait().await;
        assert_eq!(outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_pause_rejected_after_completion() {
        let (orch, _) = orchestrator(chain());
        let run = orch.create_run(ProjectConfig::new("demo", "")).await.unwrap();
        orch.start(&run.id).await.unwrap().wait().await;

        assert!(matches!(
            orch.pause(&run.id).await.unwrap_err(),
            ProjectflowError::InvalidTransition {
                operation: "pause",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_strict_inputs_hide_unrelated_outputs() {
        let side = Arc::new(MockStage::new("side"));
        let sink_stage = Arc::new(MockStage::new("sink"));
        let pipeline = PipelineBuilder::new("inputs")
            .stage(Arc::new(MockStage::new("root")), &[])
            .stage(side, &[])
            .stage(sink_stage.clone(), &["root"])
            .build()
            .unwrap();
        let (orch, _) = orchestrator(pipeline);
        let run = orch.create_run(ProjectConfig::new("demo", "")).await.unwrap();
        orch.start(&run.id).await.unwrap().wait().await;

        let seen = sink_stage.seen_inputs();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], vec!["root"]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("bad state");
        assert_eq!(panic_message(payload.as_ref()), "bad state");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[test]
    fn test_refused_transition_errors() {
        let conflict = StoreError::StatusConflict {
            run_id: "r1".into(),
            current: RunStatus::Completed,
        };
        assert!(matches!(
            transition_refused("r1", conflict, "resume"),
            ProjectflowError::InvalidTransition {
                from: RunStatus::Completed,
                operation: "resume",
                ..
            }
        ));
        assert!(matches!(
            transition_refused("r1", StoreError::NotFound("r1".into()), "pause"),
            ProjectflowError::RunNotFound(id) if id == "r1"
        ));
        assert!(matches!(
            transition_refused("r1", StoreError::Unavailable("down".into()), "start"),
            ProjectflowError::Store(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn test_whole_millis() {
        assert_eq!(whole_millis(12.6), 13);
        assert_eq!(whole_millis(-1.0), 0);
    }
}
