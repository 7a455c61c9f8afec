//! Stage trait and the generation stages.
//!
//! Stages are the units of work of a projectflow pipeline. Each one reads
//! the outputs of completed predecessors from its [`StageContext`], may call
//! the generation backend any number of times, and returns a typed output
//! plus the files it produced.
//!
//! The standard pipeline declares:
//! - [`REQUIREMENT_STAGE`] with no dependencies
//! - [`FRONTEND_STAGE`] and [`BACKEND_STAGE`] after the requirements
//! - [`VALIDATOR_STAGE`] after both generators
//! - [`DEPLOYMENT_STAGE`] after validation

mod backend;
mod context;
mod deployment;
mod frontend;
pub mod parsing;
pub mod prompts;
mod requirements;
mod result;
mod validator;

pub use backend::BackendStage;
pub use context::{StageContext, StageInputs, StageReporter};
pub use deployment::{
    DeploymentStage, BACKEND_DOCKERFILE, COMPOSE_FILE, DEPLOYMENT_GUIDE, ENV_TEMPLATE,
    FRONTEND_DOCKERFILE,
};
pub use frontend::FrontendStage;
pub use requirements::{RequirementStage, REQUIREMENTS_DOC};
pub use result::{StageFailure, StageResult, StageSuccess};
pub use validator::{ValidatorStage, VALIDATION_REPORT};

use async_trait::async_trait;
use std::fmt::Debug;

/// Requirements analysis.
pub const REQUIREMENT_STAGE: &str = "Requirement";
/// Frontend generation.
pub const FRONTEND_STAGE: &str = "Frontend";
/// Backend generation.
pub const BACKEND_STAGE: &str = "Backend";
/// Review and fixes.
pub const VALIDATOR_STAGE: &str = "Validator";
/// Deployment packaging.
pub const DEPLOYMENT_STAGE: &str = "Deployment";

/// Trait for pipeline stages.
///
/// A stage reports failure through its return value. Panics are caught by
/// the orchestrator and recorded as failures, but are never the intended
/// failure path.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    async fn execute(&self, ctx: &StageContext) -> StageResult;
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        (self.func)(ctx)
    }
}
