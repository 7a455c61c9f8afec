//! Project run state.
//!
//! This module provides:
//! - The immutable project configuration supplied at run creation
//! - The execution state mutated by the run loop
//! - The project run aggregate, its read snapshot and log entries

mod execution;
mod project;
mod run;

pub use execution::{ExecutionError, ExecutionState};
pub use project::{ProjectConfig, DEFAULT_BACKEND_FRAMEWORK, DEFAULT_FRONTEND_FRAMEWORK};
pub use run::{LogEntry, ProjectRun, RunSnapshot};
