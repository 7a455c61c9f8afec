//! Assertion helpers for runs and events.

use crate::core::{EventKind, PipelineEvent, RunStatus};
use crate::state::RunSnapshot;

/// Asserts the run has `expected` status.
pub fn assert_run_status(snapshot: &RunSnapshot, expected: RunStatus) {
    assert_eq!(
        snapshot.status, expected,
        "Expected run {} to be {:?}, got {:?} (errors: {:?})",
        snapshot.id, expected, snapshot.status, snapshot.execution_state.errors
    );
}

/// Asserts the completed stages are exactly `expected`, in order.
pub fn assert_stage_order(snapshot: &RunSnapshot, expected: &[&str]) {
    assert_eq!(
        snapshot.execution_state.completed_stages, expected,
        "Unexpected completed stages for run {}",
        snapshot.id
    );
}

/// Asserts no stage of the run recorded an error.
pub fn assert_no_errors(snapshot: &RunSnapshot) {
    assert!(
        snapshot.execution_state.errors.is_empty(),
        "Expected no errors, got {:?}",
        snapshot.execution_state.errors
    );
}

/// Lifecycle event kinds, dropping `log` and `progress`.
#[must_use]
pub fn lifecycle_kinds(events: &[PipelineEvent]) -> Vec<EventKind> {
    events
        .iter()
        .map(PipelineEvent::kind)
        .filter(|kind| !matches!(kind, EventKind::Log | EventKind::Progress))
        .collect()
}

/// Asserts exactly `count` events of `kind` were seen.
pub fn assert_event_count(events: &[PipelineEvent], kind: EventKind, count: usize) {
    let seen = events.iter().filter(|e| e.kind() == kind).count();
    assert_eq!(
        seen, count,
        "Expected {count} {kind} events, got {seen}: {:?}",
        lifecycle_kinds(events)
    );
}

/// Stages named by `stage-started` events, in order.
#[must_use]
pub fn started_stages(events: &[PipelineEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.kind() == EventKind::StageStarted)
        .filter_map(|e| e.stage().map(str::to_string))
        .collect()
}
