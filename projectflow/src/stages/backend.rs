//! Backend generation stage.

use super::parsing::{extract_artifacts, extract_endpoints};
use super::prompts::{backend_prompt, CODEGEN_SYSTEM};
use super::{Stage, StageContext, StageFailure, StageResult, StageSuccess, BACKEND_STAGE};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::core::{BackendOutput, LogLevel, StageOutput};
use async_trait::async_trait;
use std::sync::Arc;

/// Generates the API server, or skips when the project needs none.
///
/// The stage skips only when both the requirements and the project
/// configuration agree that no server is needed. A skip is a success with
/// [`BackendOutput::Skipped`] and no artifacts.
#[derive(Debug, Clone)]
pub struct BackendStage {
    backend: Arc<dyn GenerationBackend>,
}

impl BackendStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for BackendStage {
    fn name(&self) -> &str {
        BACKEND_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let requirements = ctx.inputs().requirements()?;
        let config = ctx.config();

        if !requirements.needs_backend && !config.needs_backend() {
            let reason = "the project has no server-side features".to_string();
            ctx.log(LogLevel::Info, format!("Skipping backend generation: {reason}"))
                .await;
            return Ok(StageSuccess::new(StageOutput::Backend(BackendOutput::Skipped {
                reason,
            })));
        }

        let framework = requirements
            .tech_stack
            .backend
            .as_deref()
            .unwrap_or_else(|| config.backend_framework());
        let database = requirements
            .tech_stack
            .database
            .as_deref()
            .or(config.database.as_deref());

        ctx.log(LogLevel::Info, format!("Generating {framework} backend"))
            .await;
        ctx.progress(10);

        let request = GenerationRequest::new(backend_prompt(config, requirements, framework, database))
            .with_system_instruction(CODEGEN_SYSTEM);
        let response = self
            .backend
            .generate(request)
            .await
            .map_err(|e| StageFailure::backend("backend generation", &e))?;
        ctx.progress(80);

        let artifacts = extract_artifacts(ctx.stage(), &response.content);
        if artifacts.is_empty() {
            return Err(StageFailure::new("backend generation produced no files"));
        }

        let files: Vec<String> = artifacts.iter().map(|a| a.path.clone()).collect();
        let endpoints = extract_endpoints(artifacts.iter().map(|a| a.content.as_str()));

        ctx.log(
            LogLevel::Success,
            format!(
                "Generated {} backend files exposing {} endpoints",
                files.len(),
                endpoints.len()
            ),
        )
        .await;

        Ok(StageSuccess::new(StageOutput::Backend(BackendOutput::Generated {
            framework: framework.to_string(),
            files,
            endpoints,
        }))
        .with_artifacts(artifacts))
    }
}
