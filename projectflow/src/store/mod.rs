//! Persistence of runs, logs and artifacts.
//!
//! The orchestrator consumes storage only through [`ProjectStore`]. Two
//! adapters ship with the crate: [`InMemoryProjectStore`] for tests and
//! embedding, and [`JsonFileProjectStore`] for a directory-per-run layout on
//! disk.

mod json_file;
mod memory;

pub use json_file::JsonFileProjectStore;
pub use memory::InMemoryProjectStore;

use crate::core::{GeneratedArtifact, RunStatus};
use crate::errors::StoreError;
use crate::state::{ExecutionState, LogEntry, ProjectRun};
use async_trait::async_trait;
use std::fmt::Debug;

/// Narrow CRUD interface over run records.
///
/// Status and execution state are written separately so a status change
/// requested by an operator never races with a state write from the run
/// loop. Status changes are compare-and-set: operator calls and the run
/// loop both go through [`transition_status`](Self::transition_status), so
/// a terminal status is never overwritten by a stale read.
#[async_trait]
pub trait ProjectStore: Send + Sync + Debug {
    /// Persists a new run. Fails with `AlreadyExists` on a duplicate id.
    async fn create_run(&self, run: &ProjectRun) -> Result<(), StoreError>;

    /// Loads a run.
    async fn get_run(&self, run_id: &str) -> Result<ProjectRun, StoreError>;

    /// Lists all runs ordered by creation time.
    async fn list_runs(&self) -> Result<Vec<ProjectRun>, StoreError>;

    /// Replaces the execution state of a run.
    async fn replace_state(&self, run_id: &str, state: &ExecutionState) -> Result<(), StoreError>;

    /// Moves a run to `to` if its status is one of `allowed_from`, and
    /// returns the status it had.
    ///
    /// The check and the write are atomic. A run in any other status is
    /// left untouched and the call fails with [`StoreError::StatusConflict`].
    async fn transition_status(
        &self,
        run_id: &str,
        allowed_from: &[RunStatus],
        to: RunStatus,
    ) -> Result<RunStatus, StoreError>;

    /// Appends a log entry to its run.
    async fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError>;

    /// Lists log entries of a run in append order.
    async fn list_logs(&self, run_id: &str) -> Result<Vec<LogEntry>, StoreError>;

    /// Inserts an artifact, or replaces the content of the one at the same path.
    async fn upsert_artifact(
        &self,
        run_id: &str,
        artifact: &GeneratedArtifact,
    ) -> Result<(), StoreError>;

    /// Lists artifacts of a run in first-insertion order.
    async fn list_artifacts(&self, run_id: &str) -> Result<Vec<GeneratedArtifact>, StoreError>;
}

/// Applies a status transition to a loaded run.
pub(crate) fn apply_transition(
    run: &mut ProjectRun,
    allowed_from: &[RunStatus],
    to: RunStatus,
) -> Result<RunStatus, StoreError> {
    let current = run.status;
    if !allowed_from.contains(&current) {
        return Err(StoreError::StatusConflict {
            run_id: run.id.clone(),
            current,
        });
    }
    run.status = to;
    Ok(current)
}

/// Inserts `artifact` into `artifacts`, replacing an entry with the same path
/// in place.
pub(crate) fn upsert_by_path(artifacts: &mut Vec<GeneratedArtifact>, artifact: &GeneratedArtifact) {
    match artifacts.iter_mut().find(|a| a.path == artifact.path) {
        Some(existing) => *existing = artifact.clone(),
        None => artifacts.push(artifact.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ProjectConfig;

    #[test]
    fn test_apply_transition_checks_current_status() {
        let mut run = ProjectRun::with_id("r1", ProjectConfig::new("app", ""));

        let previous = apply_transition(&mut run, &[RunStatus::Pending], RunStatus::Running).unwrap();
        assert_eq!(previous, RunStatus::Pending);
        assert_eq!(run.status, RunStatus::Running);

        let err = apply_transition(&mut run, &[RunStatus::Pending], RunStatus::Paused).unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusConflict { current: RunStatus::Running, .. }
        ));
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn test_upsert_by_path_keeps_position() {
        let mut artifacts = vec![
            GeneratedArtifact::new("Frontend", "a.ts", "1"),
            GeneratedArtifact::new("Frontend", "b.ts", "2"),
        ];
        upsert_by_path(&mut artifacts, &GeneratedArtifact::new("Validator", "a.ts", "fixed"));
        upsert_by_path(&mut artifacts, &GeneratedArtifact::new("Validator", "c.ts", "3"));

        let paths: Vec<_> = artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, ["a.ts", "b.ts", "c.ts"]);
        assert_eq!(artifacts[0].content, "fixed");
        assert_eq!(artifacts[0].stage, "Validator");
    }
}
