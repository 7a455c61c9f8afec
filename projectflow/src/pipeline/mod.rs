//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage declarations and the validated stage graph
//! - Pipeline builder with contract-coded validation errors
//! - Next-stage selection
//! - The [`Orchestrator`] that drives runs through the graph

mod builder;
mod control;
mod dag;
mod orchestrator;
mod selector;
mod spec;


pub use builder::PipelineBuilder;
pub use control::{RunHandle, RunOutcome};
pub use dag::Pipeline;
pub use orchestrator::{Orchestrator, PIPELINE_ERROR_STAGE};
pub use selector::{select_next, Selection};
pub use spec::{StageDeclaration, StageSpec};
