//! Per-run loop control and the handle returned to callers.

use crate::core::RunStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// How a run loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage completed.
    Completed,
    /// The loop stopped at a stage boundary after a pause request.
    Paused,
    /// A stage failed, or no stage could be selected.
    Failed {
        /// The failing stage, or `pipeline` for selection failures.
        stage: String,
        /// The failure message.
        message: String,
    },
    /// A state transition could not be persisted; the loop gave up.
    Aborted {
        /// Why the loop gave up.
        reason: String,
    },
}

impl RunOutcome {
    /// Returns true for [`RunOutcome::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The run status this outcome leaves behind.
    ///
    /// An aborted loop could not write, so the stored status is whatever
    /// it was before.
    #[must_use]
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            Self::Completed => Some(RunStatus::Completed),
            Self::Paused => Some(RunStatus::Paused),
            Self::Failed { .. } => Some(RunStatus::Error),
            Self::Aborted { .. } => None,
        }
    }
}

/// Shared between the orchestrator and one run loop.
#[derive(Debug)]
pub(crate) struct RunControl {
    pause_requested: AtomicBool,
    outcome: watch::Sender<Option<RunOutcome>>,
}

impl RunControl {
    pub(crate) fn new() -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            pause_requested: AtomicBool::new(false),
            outcome,
        })
    }

    pub(crate) fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
    }

    /// Clears a pending pause request, returning whether one was set.
    pub(crate) fn take_pause(&self) -> bool {
        self.pause_requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn handle(&self, run_id: &str) -> RunHandle {
        RunHandle {
            run_id: run_id.to_string(),
            outcome: self.outcome.subscribe(),
        }
    }

    pub(crate) fn finish(&self, outcome: RunOutcome) {
        self.outcome.send_replace(Some(outcome));
    }
}

/// Handle to a run loop started by `start` or `resume`.
///
/// Dropping the handle does not stop the loop.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: String,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl RunHandle {
    /// A handle whose outcome is already known.
    pub(crate) fn finished(run_id: &str, outcome: RunOutcome) -> Self {
        let (_sender, receiver) = watch::channel(Some(outcome));
        Self {
            run_id: run_id.to_string(),
            outcome: receiver,
        }
    }

    /// The run this handle follows.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The outcome, if the loop has ended.
    #[must_use]
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits for the loop to end.
    pub async fn wait(mut self) -> RunOutcome {
        if let Ok(outcome) = self.outcome.wait_for(Option::is_some).await {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
        }
        self.outcome.borrow().clone().unwrap_or_else(|| RunOutcome::Aborted {
            reason: "run loop ended without reporting an outcome".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_wait_returns_outcome() {
        let control = RunControl::new();
        let handle = control.handle("run-1");
        assert_eq!(handle.outcome(), None);

        let waiter = tokio::spawn(handle.wait());
        control.finish(RunOutcome::Paused);
        assert_eq!(waiter.await.unwrap(), RunOutcome::Paused);
    }

    #[tokio::test]
    async fn test_finished_handle() {
        let handle = RunHandle::finished("run-1", RunOutcome::Completed);
        assert_eq!(handle.run_id(), "run-1");
        assert_eq!(handle.wait().await, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_dropped_control_aborts_waiters() {
        let control = RunControl::new();
        let handle = control.handle("run-1");
        drop(control);
        assert!(matches!(handle.wait().await, RunOutcome::Aborted { .. }));
    }

    #[test]
    fn test_take_pause_clears_flag() {
        let control = RunControl::new();
        assert!(!control.take_pause());
        control.request_pause();
        assert!(control.pause_requested());
        assert!(control.take_pause());
        assert!(!control.pause_requested());
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(RunOutcome::Completed.status(), Some(RunStatus::Completed));
        let failed = RunOutcome::Failed {
            stage: "Frontend".into(),
            message: "boom".into(),
        };
        assert_eq!(failed.status(), Some(RunStatus::Error));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["stage"], "Frontend");
    }
}
