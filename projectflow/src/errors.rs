//! Error types for the projectflow orchestration engine.
//!
//! Stage failures are *values* (`StageFailure`) and never appear here; this
//! module covers configuration, state, persistence and backend errors.

use crate::core::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for projectflow operations.
#[derive(Debug, Error)]
pub enum ProjectflowError {
    /// The stage graph failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The requested operation is not valid from the run's current status.
    #[error("Cannot {operation} run '{run_id}' while it is {from}")]
    InvalidTransition {
        /// The run identifier.
        run_id: String,
        /// The status the run was in.
        from: RunStatus,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The run does not exist.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// A run loop is already driving this run.
    #[error("Run '{0}' already has an active run loop")]
    RunAlreadyActive(String),

    /// A persistence operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when stage graph validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the stage graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Raised by the run loop when no stage can run but some remain.
///
/// This means the persisted execution state disagrees with the graph, for
/// instance after a partial failure left a dependency uncompleted.
#[derive(Debug, Clone, Error)]
#[error("No eligible stage; remaining stages have unsatisfied dependencies: {}", remaining.join(", "))]
pub struct DependencyInconsistencyError {
    /// Stages that are declared but not completed.
    pub remaining: Vec<String>,
}

impl DependencyInconsistencyError {
    /// Creates a new dependency inconsistency error.
    #[must_use]
    pub fn new(remaining: Vec<String>) -> Self {
        Self { remaining }
    }
}

/// Errors raised by a [`ProjectStore`](crate::store::ProjectStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The run does not exist.
    #[error("Run not found in store: {0}")]
    NotFound(String),

    /// A run with this identifier already exists.
    #[error("Run already exists in store: {0}")]
    AlreadyExists(String),

    /// Filesystem error.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A status transition found the run in a status it does not start from.
    #[error("Run '{run_id}' is {current}")]
    StatusConflict {
        /// The run identifier.
        run_id: String,
        /// The status the run was found in.
        current: RunStatus,
    },
}

/// Errors returned by a [`GenerationBackend`](crate::backend::GenerationBackend).
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// The service answered with an error.
    #[error("API error{}: {message}", status_code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Api {
        /// Error message.
        message: String,
        /// HTTP status code, when there was one.
        status_code: Option<u16>,
    },

    /// The request did not finish in time.
    #[error("Generation request timed out after {seconds}s")]
    Timeout {
        /// Timeout in seconds.
        seconds: u64,
    },

    /// The service answered with something that is not a completion.
    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    /// Missing API key, bad URL, ...
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// Network-level failure.
    #[error("Network error: {0}")]
    Network(String),
}

impl BackendError {
    /// Creates an API error without a status code.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status_code: None,
        }
    }
}
