//! Test doubles for stages, the generation backend and the store.

use super::fixtures;
use crate::backend::{GenerationBackend, GenerationRequest, GenerationResponse};
use crate::core::{GeneratedArtifact, LogLevel, RunStatus, StageOutput};
use crate::errors::{BackendError, StoreError};
use crate::stages::{Stage, StageContext, StageFailure, StageResult, StageSuccess};
use crate::state::{ExecutionState, LogEntry, ProjectRun};
use crate::store::{InMemoryProjectStore, ProjectStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A stage that records its calls and returns a configurable output.
///
/// The default output is the fixture matching the stage name, so a
/// pipeline of mocks named after the standard stages type-checks its
/// inputs the same way the real stages do.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    output: Mutex<StageOutput>,
    artifacts: Mutex<Vec<GeneratedArtifact>>,
    calls: AtomicUsize,
    seen_inputs: Mutex<Vec<Vec<String>>>,
}

impl MockStage {
    /// Creates a mock returning the fixture output for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            output: Mutex::new(fixtures::output_for(&name)),
            name,
            artifacts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            seen_inputs: Mutex::new(Vec::new()),
        }
    }

    /// Sets the output to return.
    #[must_use]
    pub fn with_output(self, output: StageOutput) -> Self {
        *self.output.lock() = output;
        self
    }

    /// Sets the artifacts to return.
    #[must_use]
    pub fn with_artifacts(self, artifacts: Vec<GeneratedArtifact>) -> Self {
        *self.artifacts.lock() = artifacts;
        self
    }

    /// Adds one artifact attributed to this stage.
    #[must_use]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.artifacts
            .lock()
            .push(GeneratedArtifact::new(&self.name, path, content));
        self
    }

    /// Replaces the output after construction.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Number of executions so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Stage names visible in the inputs, one entry per execution.
    #[must_use]
    pub fn seen_inputs(&self) -> Vec<Vec<String>> {
        self.seen_inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_inputs
            .lock()
            .push(ctx.inputs().stages().map(str::to_string).collect());
        ctx.progress(50);

        let output = self.output.lock().clone();
        let artifacts = self.artifacts.lock().clone();
        Ok(StageSuccess::new(output).with_artifacts(artifacts))
    }
}

/// A stage that fails, optionally only for its first few calls.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    message: String,
    remaining_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates a stage that always fails with `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            remaining_failures: AtomicUsize::new(usize::MAX),
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a stage that fails once, then returns the fixture output.
    #[must_use]
    pub fn once(name: impl Into<String>, message: impl Into<String>) -> Self {
        let stage = Self::new(name, message);
        stage.remaining_failures.store(1, Ordering::SeqCst);
        stage
    }

    /// Number of executions so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if failing {
            ctx.log(LogLevel::Error, format!("failing on purpose: {}", self.message))
                .await;
            Err(StageFailure::new(&self.message))
        } else {
            Ok(StageSuccess::new(fixtures::output_for(&self.name)))
        }
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
    message: String,
}

impl PanickingStage {
    /// Creates a stage that panics with `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)]
    async fn execute(&self, _ctx: &StageContext) -> StageResult {
        panic!("{}", self.message)
    }
}

/// Wraps a stage and holds it at entry until released.
///
/// Lets a test act while a stage is provably in flight.
#[derive(Debug)]
pub struct GatedStage {
    inner: Arc<dyn Stage>,
    entered: Notify,
    release: Notify,
}

impl GatedStage {
    /// Gates `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Stage>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Waits until the stage has started executing.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the held execution continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Stage for GatedStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.execute(ctx).await
    }
}

#[derive(Debug)]
struct Rule {
    marker: String,
    replies: VecDeque<Result<String, BackendError>>,
}

/// A generation backend answering from a script.
///
/// A prompt is answered by the first rule whose marker it contains.
/// Replies registered for the same marker are used in order; the last one
/// repeats. Prompts matching no rule get an invalid-response error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    /// Creates a backend with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers prompts containing `marker` with `text`.
    #[must_use]
    pub fn on(self, marker: &str, text: impl Into<String>) -> Self {
        self.push(marker, Ok(text.into()))
    }

    /// Fails prompts containing `marker` with `error`.
    #[must_use]
    pub fn on_error(self, marker: &str, error: BackendError) -> Self {
        self.push(marker, Err(error))
    }

    fn push(self, marker: &str, reply: Result<String, BackendError>) -> Self {
        {
            let mut rules = self.rules.lock();
            match rules.iter_mut().find(|rule| rule.marker == marker) {
                Some(rule) => rule.replies.push_back(reply),
                None => rules.push(Rule {
                    marker: marker.to_string(),
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests whose prompt contains `marker`.
    #[must_use]
    pub fn calls_for(&self, marker: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.prompt.contains(marker))
            .count()
    }

    fn reply(&self, prompt: &str) -> Option<Result<String, BackendError>> {
        let mut rules = self.rules.lock();
        let rule = rules.iter_mut().find(|rule| prompt.contains(&rule.marker))?;
        if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, BackendError> {
        let reply = self.reply(&request.prompt);
        let first_line = request.prompt.lines().next().unwrap_or_default().to_string();
        self.requests.lock().push(request);

        match reply {
            Some(Ok(text)) => Ok(GenerationResponse::new(text, "scripted", 0)),
            Some(Err(err)) => Err(err),
            None => Err(BackendError::InvalidResponse(format!(
                "no scripted reply for prompt '{first_line}'"
            ))),
        }
    }
}

/// An in-memory store whose writes can be made to fail or lag.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryProjectStore,
    state_writes_left: Mutex<Option<usize>>,
    failing_status: Mutex<Option<RunStatus>>,
    read_delay: Mutex<Option<Duration>>,
    transition_delay: Mutex<Option<Duration>>,
}

impl FlakyStore {
    /// Creates a store that does not fail yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `n` more `replace_state` calls through, then fails the rest.
    pub fn fail_state_writes_after(&self, n: usize) {
        *self.state_writes_left.lock() = Some(n);
    }

    /// Fails every status transition to `status`.
    pub fn fail_status(&self, status: RunStatus) {
        *self.failing_status.lock() = Some(status);
    }

    /// The next `get_run` reads the run, then waits `delay` before
    /// returning it, so the caller acts on a stale copy.
    pub fn delay_next_read(&self, delay: Duration) {
        *self.read_delay.lock() = Some(delay);
    }

    /// The next `transition_status` waits `delay` before checking and
    /// writing the status.
    pub fn delay_next_transition(&self, delay: Duration) {
        *self.transition_delay.lock() = Some(delay);
    }

    /// Stops injecting failures.
    pub fn heal(&self) {
        *self.state_writes_left.lock() = None;
        *self.failing_status.lock() = None;
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &InMemoryProjectStore {
        &self.inner
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {what} failure"))
}

#[async_trait]
impl ProjectStore for FlakyStore {
    async fn create_run(&self, run: &ProjectRun) -> Result<(), StoreError> {
        self.inner.create_run(run).await
    }

    async fn get_run(&self, run_id: &str) -> Result<ProjectRun, StoreError> {
        let run = self.inner.get_run(run_id).await;
        let delay = self.read_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        run
    }

    async fn list_runs(&self) -> Result<Vec<ProjectRun>, StoreError> {
        self.inner.list_runs().await
    }

    async fn replace_state(&self, run_id: &str, state: &ExecutionState) -> Result<(), StoreError> {
        {
            let mut left = self.state_writes_left.lock();
            match left.as_mut() {
                Some(0) => return Err(injected("state write")),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.replace_state(run_id, state).await
    }

    async fn transition_status(
        &self,
        run_id: &str,
        allowed_from: &[RunStatus],
        to: RunStatus,
    ) -> Result<RunStatus, StoreError> {
        let delay = self.transition_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.failing_status.lock() == Some(to) {
            return Err(injected("status write"));
        }
        self.inner.transition_status(run_id, allowed_from, to).await
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        self.inner.append_log(entry).await
    }

    async fn list_logs(&self, run_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        self.inner.list_logs(run_id).await
    }

    async fn upsert_artifact(&self, run_id: &str, artifact: &GeneratedArtifact) -> Result<(), StoreError> {
        self.inner.upsert_artifact(run_id, artifact).await
    }

    async fn list_artifacts(&self, run_id: &str) -> Result<Vec<GeneratedArtifact>, StoreError> {
        self.inner.list_artifacts(run_id).await
    }
}
