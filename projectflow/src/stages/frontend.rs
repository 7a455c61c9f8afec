//! Frontend generation stage.

use super::parsing::extract_artifacts;
use super::prompts::{frontend_prompt, CODEGEN_SYSTEM};
use super::{Stage, StageContext, StageFailure, StageResult, StageSuccess, FRONTEND_STAGE};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::core::{FrontendOutput, LogLevel, StageOutput};
use async_trait::async_trait;
use std::sync::Arc;

const ENTRY_CANDIDATES: [&str; 8] = [
    "src/main.tsx",
    "src/main.ts",
    "src/main.jsx",
    "src/main.js",
    "src/index.tsx",
    "src/index.jsx",
    "src/index.js",
    "index.html",
];

/// Generates the frontend from the requirements.
#[derive(Debug, Clone)]
pub struct FrontendStage {
    backend: Arc<dyn GenerationBackend>,
}

impl FrontendStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for FrontendStage {
    fn name(&self) -> &str {
        FRONTEND_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let requirements = ctx.inputs().requirements()?;
        let framework = if requirements.tech_stack.frontend.is_empty() {
            ctx.config().frontend_framework()
        } else {
            requirements.tech_stack.frontend.as_str()
        };

        ctx.log(LogLevel::Info, format!("Generating {framework} frontend"))
            .await;
        ctx.progress(10);

        let request = GenerationRequest::new(frontend_prompt(ctx.config(), requirements, framework))
            .with_system_instruction(CODEGEN_SYSTEM);
        let response = self
            .backend
            .generate(request)
            .await
            .map_err(|e| StageFailure::backend("frontend generation", &e))?;
        ctx.progress(80);

        let artifacts = extract_artifacts(ctx.stage(), &response.content);
        if artifacts.is_empty() {
            return Err(StageFailure::new("frontend generation produced no files"));
        }

        let files: Vec<String> = artifacts.iter().map(|a| a.path.clone()).collect();
        let entry_point = ENTRY_CANDIDATES
            .iter()
            .find(|candidate| files.iter().any(|f| f == *candidate))
            .map(|candidate| (*candidate).to_string());

        ctx.log(
            LogLevel::Success,
            format!("Generated {} frontend files", files.len()),
        )
        .await;

        Ok(StageSuccess::new(StageOutput::Frontend(FrontendOutput {
            framework: framework.to_string(),
            files,
            entry_point,
        }))
        .with_artifacts(artifacts))
    }
}
