//! JSON-file store.
//!
//! Layout, one directory per run under the root:
//!
//! ```text
//! <root>/<run_id>/run.json        ProjectRun (status + execution state)
//! <root>/<run_id>/logs.jsonl      one LogEntry per line, append-only
//! <root>/<run_id>/artifacts.json  Vec<GeneratedArtifact>
//! ```
//!
//! `run.json` and `artifacts.json` are replaced whole through a temp file and
//! a rename, so a reader never sees a half-written document.

use super::{apply_transition, upsert_by_path, ProjectStore};
use crate::config::{OrchestratorConfig, ENV_STATE_DIR};
use crate::core::{GeneratedArtifact, RunStatus};
use crate::errors::{ProjectflowError, StoreError};
use crate::state::{ExecutionState, LogEntry, ProjectRun};
use async_trait::async_trait;
use crate::utils::now_utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const RUN_FILE: &str = "run.json";
const LOGS_FILE: &str = "logs.jsonl";
const ARTIFACTS_FILE: &str = "artifacts.json";

/// A [`ProjectStore`] persisting each run as JSON files on disk.
#[derive(Debug)]
pub struct JsonFileProjectStore {
    root: PathBuf,
    // Serialises read-modify-write cycles on run.json and artifacts.json.
    write_lock: Mutex<()>,
}

impl JsonFileProjectStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "Opened JSON file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Opens the store at [`OrchestratorConfig::state_dir`].
    ///
    /// Fails with a configuration error when no state directory is set.
    pub async fn from_config(config: &OrchestratorConfig) -> Result<Self, ProjectflowError> {
        let Some(root) = &config.state_dir else {
            return Err(ProjectflowError::Config(format!(
                "state_dir is not set; configure it or export {ENV_STATE_DIR}"
            )));
        };
        Ok(Self::open(root.clone()).await?)
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(self.root.join(run_id))
        } else {
            Err(StoreError::NotFound(run_id.to_string()))
        }
    }

    async fn existing_run_dir(&self, run_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.run_dir(run_id)?;
        if fs::metadata(dir.join(RUN_FILE)).await.is_ok() {
            Ok(dir)
        } else {
            Err(StoreError::NotFound(run_id.to_string()))
        }
    }

    async fn load_run(&self, dir: &Path, run_id: &str) -> Result<ProjectRun, StoreError> {
        read_json(&dir.join(RUN_FILE))
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))
    }

    /// Read-modify-write of `run.json` under the write lock. Nothing is
    /// written when `f` fails.
    async fn update_run<T>(
        &self,
        run_id: &str,
        f: impl FnOnce(&mut ProjectRun) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.existing_run_dir(run_id).await?;
        let mut run = self.load_run(&dir, run_id).await?;
        let value = f(&mut run)?;
        run.updated_at = now_utc();
        write_json_atomic(&dir.join(RUN_FILE), &run).await?;
        Ok(value)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn write_json_atomic<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ProjectStore for JsonFileProjectStore {
    async fn create_run(&self, run: &ProjectRun) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.run_dir(&run.id)?;
        if fs::metadata(dir.join(RUN_FILE)).await.is_ok() {
            return Err(StoreError::AlreadyExists(run.id.clone()));
        }
        fs::create_dir_all(&dir).await?;
        write_json_atomic(&dir.join(ARTIFACTS_FILE), &Vec::<GeneratedArtifact>::new()).await?;
        write_json_atomic(&dir.join(RUN_FILE), run).await?;
        tracing::debug!(run_id = %run.id, "Created run directory");
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<ProjectRun, StoreError> {
        let dir = self.existing_run_dir(run_id).await?;
        self.load_run(&dir, run_id).await
    }

    async fn list_runs(&self) -> Result<Vec<ProjectRun>, StoreError> {
        let mut runs = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match read_json::<ProjectRun>(&entry.path().join(RUN_FILE)).await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "Skipping unreadable run directory"
                    );
                }
            }
        }

        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(runs)
    }

    async fn replace_state(&self, run_id: &str, state: &ExecutionState) -> Result<(), StoreError> {
        let state = state.clone();
        self.update_run(run_id, move |run| {
            run.execution_state = state;
            Ok(())
        })
        .await
    }

    async fn transition_status(
        &self,
        run_id: &str,
        allowed_from: &[RunStatus],
        to: RunStatus,
    ) -> Result<RunStatus, StoreError> {
        self.update_run(run_id, |run| apply_transition(run, allowed_from, to))
            .await
    }

    async fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let dir = self.existing_run_dir(&entry.run_id).await?;
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOGS_FILE))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list_logs(&self, run_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let dir = self.existing_run_dir(run_id).await?;
        let content = match fs::read_to_string(dir.join(LOGS_FILE)).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    async fn upsert_artifact(
        &self,
        run_id: &str,
        artifact: &GeneratedArtifact,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.existing_run_dir(run_id).await?;
        let path = dir.join(ARTIFACTS_FILE);
        let mut artifacts: Vec<GeneratedArtifact> = read_json(&path).await?.unwrap_or_default();
        upsert_by_path(&mut artifacts, artifact);
        write_json_atomic(&path, &artifacts).await
    }

    async fn list_artifacts(&self, run_id: &str) -> Result<Vec<GeneratedArtifact>, StoreError> {
        let dir = self.existing_run_dir(run_id).await?;
        Ok(read_json(&dir.join(ARTIFACTS_FILE)).await?.unwrap_or_default())
    }
}
