//! # Projectflow
//!
//! Resumable orchestration of multi-stage project generation pipelines.
//!
//! A run turns a [`ProjectConfig`](state::ProjectConfig) into generated
//! source files by driving five stages over a dependency graph:
//!
//! ```text
//! Requirement ──┬── Frontend ──┬── Validator ── Deployment
//!               └── Backend  ──┘
//! ```
//!
//! - **Dependency-aware selection**: the next stage is the first declared
//!   stage whose dependencies have all completed
//! - **Durable progress**: every transition is written to a
//!   [`ProjectStore`](store::ProjectStore) before the run moves on, so a
//!   run can be paused, fail, and be resumed from where it stopped
//! - **Event streaming**: lifecycle, progress and log events are published
//!   on an [`EventChannel`](events::EventChannel) for live observers
//! - **Pluggable generation**: stages talk to a
//!   [`GenerationBackend`](backend::GenerationBackend); an HTTP adapter is
//!   available behind the `http` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use projectflow::prelude::*;
//!
//! let backend = Arc::new(HttpGenerationBackend::from_env()?);
//! let pipeline = PipelineBuilder::standard(backend).build()?;
//! let orchestrator = Orchestrator::new(
//!     pipeline,
//!     Arc::new(InMemoryProjectStore::new()),
//!     EventChannel::new(256),
//! );
//!
//! let run = orchestrator
//!     .create_run(ProjectConfig::new("todo-app", "A collaborative todo list"))
//!     .await?;
//! let outcome = orchestrator.start(&run.id).await?.wait().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod state;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::{
        GenerationBackend, GenerationRequest, GenerationResponse, HttpBackendConfig,
    };
    #[cfg(feature = "http")]
    pub use crate::backend::HttpGenerationBackend;
    pub use crate::config::OrchestratorConfig;
    pub use crate::core::{
        EventKind, GeneratedArtifact, LogLevel, PipelineEvent, RunStatus, StageOutput,
    };
    pub use crate::errors::{BackendError, ProjectflowError, StoreError};
    pub use crate::events::{EventChannel, EventFilter, EventSink, LoggingEventSink};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{Orchestrator, Pipeline, PipelineBuilder, RunHandle, RunOutcome};
    pub use crate::stages::{Stage, StageContext, StageResult, StageSuccess};
    pub use crate::state::{ProjectConfig, RunSnapshot};
    pub use crate::store::{InMemoryProjectStore, JsonFileProjectStore, ProjectStore};
    pub use std::sync::Arc;
}
