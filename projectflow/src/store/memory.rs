//! In-memory store.

use super::{apply_transition, upsert_by_path, ProjectStore};
use crate::core::{GeneratedArtifact, RunStatus};
use crate::errors::StoreError;
use crate::state::{ExecutionState, LogEntry, ProjectRun};
use async_trait::async_trait;
use crate::utils::now_utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct RunRecord {
    run: ProjectRun,
    logs: Vec<LogEntry>,
    artifacts: Vec<GeneratedArtifact>,
}

/// A [`ProjectStore`] holding everything in process memory.
///
/// Clones share the same underlying records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectStore {
    records: Arc<RwLock<HashMap<String, RunRecord>>>,
}

impl InMemoryProjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no run is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn with_record<T>(
        &self,
        run_id: &str,
        f: impl FnOnce(&mut RunRecord) -> T,
    ) -> Result<T, StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(run_id)
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
        Ok(f(record))
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn create_run(&self, run: &ProjectRun) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(&run.id) {
            return Err(StoreError::AlreadyExists(run.id.clone()));
        }
        records.insert(
            run.id.clone(),
            RunRecord {
                run: run.clone(),
                logs: Vec::new(),
                artifacts: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<ProjectRun, StoreError> {
        self.records
            .read()
            .get(run_id)
            .map(|record| record.run.clone())
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))
    }

    async fn list_runs(&self) -> Result<Vec<ProjectRun>, StoreError> {
        let mut runs: Vec<ProjectRun> = self
            .records
            .read()
            .values()
            .map(|record| record.run.clone())
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(runs)
    }

    async fn replace_state(&self, run_id: &str, state: &ExecutionState) -> Result<(), StoreError> {
        self.with_record(run_id, |record| {
            record.run.execution_state = state.clone();
            record.run.updated_at = now_utc();
        })
    }

    async fn transition_status(
        &self,
        run_id: &str,
        allowed_from: &[RunStatus],
        to: RunStatus,
    ) -> Result<RunStatus, StoreError> {
        self.with_record(run_id, |record| {
            apply_transition(&mut record.run, allowed_from, to).map(|previous| {
                record.run.updated_at = now_utc();
                previous
            })
        })?
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        self.with_record(&entry.run_id, |record| record.logs.push(entry.clone()))
    }

    async fn list_logs(&self, run_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        self.with_record(run_id, |record| record.logs.clone())
    }

    async fn upsert_artifact(
        &self,
        run_id: &str,
        artifact: &GeneratedArtifact,
    ) -> Result<(), StoreError> {
        self.with_record(run_id, |record| upsert_by_path(&mut record.artifacts, artifact))
    }

    async fn list_artifacts(&self, run_id: &str) -> Result<Vec<GeneratedArtifact>, StoreError> {
        self.with_record(run_id, |record| record.artifacts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use crate::state::ProjectConfig;

    fn run(id: &str) -> ProjectRun {
        ProjectRun::with_id(id, ProjectConfig::new("app", "test"))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryProjectStore::new();
        store.create_run(&run("r1")).await.unwrap();

        let loaded = store.get_run("r1").await.unwrap();
        assert_eq!(loaded.id, "r1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let store = InMemoryProjectStore::new();
        store.create_run(&run("r1")).await.unwrap();

        let err = store.create_run(&run("r1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "r1"));
    }

    #[tokio::test]
    async fn test_missing_run() {
        let store = InMemoryProjectStore::new();
        assert!(matches!(
            store.get_run("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store
                .transition_status("nope", &[RunStatus::Pending], RunStatus::Running)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_status_and_state_are_independent() {
        let store = InMemoryProjectStore::new();
        store.create_run(&run("r1")).await.unwrap();

        store
            .transition_status("r1", &[RunStatus::Pending], RunStatus::Paused)
            .await
            .unwrap();
        let mut state = ExecutionState::new();
        state.begin_stage("Requirement");
        store.replace_state("r1", &state).await.unwrap();

        let loaded = store.get_run("r1").await.unwrap();
        assert_eq!(loaded.status, RunStatus::Paused);
        assert_eq!(loaded.execution_state.current_stage.as_deref(), Some("Requirement"));
    }

    #[tokio::test]
    async fn test_transition_refuses_terminal_status() {
        let store = InMemoryProjectStore::new();
        store.create_run(&run("r1")).await.unwrap();
        store
            .transition_status("r1", &[RunStatus::Pending], RunStatus::Error)
            .await
            .unwrap();
        let before = store.get_run("r1").await.unwrap();

        let err = store
            .transition_status("r1", &[RunStatus::Pending, RunStatus::Running], RunStatus::Paused)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusConflict { ref run_id, current: RunStatus::Error } if run_id == "r1"
        ));

        let after = store.get_run("r1").await.unwrap();
        assert_eq!(after.status, RunStatus::Error);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_logs_in_append_order() {
        let store = InMemoryProjectStore::new();
        store.create_run(&run("r1")).await.unwrap();

        for message in ["one", "two", "three"] {
            store
                .append_log(&LogEntry::new("r1", None, LogLevel::Info, message))
                .await
                .unwrap();
        }

        let messages: Vec<String> = store
            .list_logs("r1")
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(messages, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_artifact_upsert() {
        let store = InMemoryProjectStore::new();
        store.create_run(&run("r1")).await.unwrap();

        store
            .upsert_artifact("r1", &GeneratedArtifact::new("Backend", "server.js", "v1"))
            .await
            .unwrap();
        store
            .upsert_artifact("r1", &GeneratedArtifact::new("Validator", "server.js", "v2"))
            .await
            .unwrap();

        let artifacts = store.list_artifacts("r1").await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].content, "v2");
    }

    #[tokio::test]
    async fn test_list_runs_ordered() {
        let store = InMemoryProjectStore::new();
        let first = run("b");
        let mut second = run("a");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.create_run(&second).await.unwrap();
        store.create_run(&first).await.unwrap();

        let ids: Vec<String> = store.list_runs().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["b", "a"]);
    }
}
