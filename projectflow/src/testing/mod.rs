//! Testing utilities for projectflow pipelines.
//!
//! This module provides:
//! - Mock stages, a scripted generation backend and a fault-injecting store
//! - Canned model responses and typed stage outputs
//! - A stage-context harness backed by an in-memory run
//! - Assertions over run snapshots and event streams

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_event_count, assert_no_errors, assert_run_status, assert_stage_order, lifecycle_kinds,
    started_stages,
};
pub use fixtures::{StageHarness, TestContext};
pub use mocks::{FailingStage, FlakyStore, GatedStage, MockStage, PanickingStage, ScriptedBackend};
