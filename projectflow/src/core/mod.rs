//! Core domain model types for projectflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Run status and log level enums
//! - Typed stage outputs, one variant per generation stage
//! - Generated artifacts and pipeline events

mod artifact;
mod event;
mod output;
#[cfg(test)]
mod output_tests;
mod status;

pub use artifact::{language_for_path, normalize_path, GeneratedArtifact};
pub use event::{EventKind, PipelineEvent};
pub use output::{
    BackendOutput, DeploymentOutput, FrontendOutput, IssueSeverity, RequirementsOutput,
    StageOutput, TechStack, ValidationIssue, ValidationOutput,
};
pub use status::{LogLevel, RunStatus};
