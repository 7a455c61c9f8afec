//! Review stage: finds issues in the generated code and fixes critical ones.

use super::parsing::{extract_artifacts, parse_issues};
use super::prompts::{fix_prompt, review_prompt, CODEGEN_SYSTEM, REVIEW_SYSTEM};
use super::{Stage, StageContext, StageFailure, StageResult, StageSuccess, VALIDATOR_STAGE};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::core::{
    GeneratedArtifact, IssueSeverity, LogLevel, StageOutput, ValidationIssue, ValidationOutput,
};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

/// Path of the review report artifact.
pub const VALIDATION_REPORT: &str = "docs/VALIDATION_REPORT.md";

/// Reviews frontend and backend files.
///
/// At least one critical finding triggers a second call asking for
/// corrected files. Those are returned as artifacts, which replace the
/// originals by path when persisted, and the run is marked not
/// production-ready.
#[derive(Debug, Clone)]
pub struct ValidatorStage {
    backend: Arc<dyn GenerationBackend>,
}

impl ValidatorStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for ValidatorStage {
    fn name(&self) -> &str {
        VALIDATOR_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let frontend = ctx.inputs().frontend()?;
        let backend = ctx.inputs().backend()?;

        let files: Vec<&GeneratedArtifact> = frontend
            .files
            .iter()
            .chain(backend.files())
            .filter_map(|path| ctx.artifact(path))
            .collect();

        ctx.log(LogLevel::Info, format!("Reviewing {} generated files", files.len()))
            .await;
        ctx.progress(10);

        let request = GenerationRequest::new(review_prompt(ctx.config(), &files))
            .with_system_instruction(REVIEW_SYSTEM);
        let report = self
            .backend
            .generate(request)
            .await
            .map_err(|e| StageFailure::backend("code review", &e))?
            .content;
        ctx.progress(50);

        let issues = parse_issues(&report);
        let critical = issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Critical)
            .count();

        let mut artifacts = Vec::new();
        if critical > 0 {
            ctx.log(
                LogLevel::Warn,
                format!("Found {critical} critical issues; requesting fixes"),
            )
            .await;

            let request = GenerationRequest::new(fix_prompt(&report, &files))
                .with_system_instruction(CODEGEN_SYSTEM);
            let response = self
                .backend
                .generate(request)
                .await
                .map_err(|e| StageFailure::backend("fix generation", &e))?;
            artifacts = extract_artifacts(ctx.stage(), &response.content);

            let returned = artifacts.len();
            artifacts.retain(|fix| {
                ctx.artifact(&fix.path)
                    .map_or(true, |original| !original.same_content(fix))
            });
            if artifacts.len() < returned {
                ctx.log(
                    LogLevel::Warn,
                    format!("Ignored {} unchanged files in fix response", returned - artifacts.len()),
                )
                .await;
            }

            if artifacts.is_empty() {
                ctx.log(LogLevel::Warn, "Fix response contained no files").await;
            }
        }
        ctx.progress(90);

        let fixes: Vec<String> = artifacts.iter().map(|a| a.path.clone()).collect();
        let is_production_ready = critical == 0;

        artifacts.push(GeneratedArtifact::new(
            ctx.stage(),
            VALIDATION_REPORT,
            render(&issues, &fixes, is_production_ready),
        ));

        let level = if is_production_ready {
            LogLevel::Success
        } else {
            LogLevel::Warn
        };
        ctx.reporter()
            .log_with_metadata(
                level,
                format!(
                    "Review complete: {} issues, {} fixed files",
                    issues.len(),
                    fixes.len()
                ),
                serde_json::json!({
                    "critical": critical,
                    "production_ready": is_production_ready,
                }),
            )
            .await;

        Ok(StageSuccess::new(StageOutput::Validation(ValidationOutput {
            is_production_ready,
            issues,
            fixes,
            report,
        }))
        .with_artifacts(artifacts))
    }
}

fn render(issues: &[ValidationIssue], fixes: &[String], production_ready: bool) -> String {
    let mut doc = String::from("# Validation Report\n\n");
    let _ = writeln!(
        doc,
        "Production ready: {}\n",
        if production_ready { "yes" } else { "no" }
    );

    doc.push_str("## Issues\n\n");
    if issues.is_empty() {
        doc.push_str("No issues found.\n");
    }
    for issue in issues {
        let _ = writeln!(doc, "- **{}**: {}", issue.severity, issue.message);
    }

    if !fixes.is_empty() {
        doc.push_str("\n## Fixed files\n\n");
        for path in fixes {
            let _ = writeln!(doc, "- `{path}`");
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BackendOutput;
    use crate::stages::prompts::{FIX_HEADING, REVIEW_HEADING};
    use crate::stages::{BACKEND_STAGE, FRONTEND_STAGE};
    use crate::testing::{fixtures, ScriptedBackend, TestContext};
    use pretty_assertions::assert_eq;

    fn context() -> TestContext {
        TestContext::new()
            .with_input(FRONTEND_STAGE, fixtures::frontend_output())
            .with_input(BACKEND_STAGE, fixtures::backend_output())
            .with_artifacts(fixtures::generated_files())
    }

    #[tokio::test]
    async fn test_clean_review_is_production_ready() {
        let backend = Arc::new(ScriptedBackend::new().on(REVIEW_HEADING, fixtures::CLEAN_REVIEW));
        let ctx = context().build(VALIDATOR_STAGE).await;

        let success = ValidatorStage::new(backend.clone()).execute(&ctx).await.unwrap();
        let validation = success.output.as_validation().unwrap();

        assert!(validation.is_production_ready);
        assert!(validation.fixes.is_empty());
        assert_eq!(validation.critical_count(), 0);
        assert_eq!(backend.requests().len(), 1);

        let paths: Vec<_> = success.artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec![VALIDATION_REPORT]);
    }

    #[tokio::test]
    async fn test_critical_issues_trigger_fixes() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on(REVIEW_HEADING, fixtures::CRITICAL_REVIEW)
                .on(FIX_HEADING, fixtures::FIX_RESPONSE),
        );
        let ctx = context().build(VALIDATOR_STAGE).await;

        let success = ValidatorStage::new(backend.clone()).execute(&ctx).await.unwrap();
        let validation = success.output.as_validation().unwrap();

        assert!(!validation.is_production_ready);
        assert_eq!(validation.critical_count(), 1);
        assert_eq!(validation.fixes, vec!["server.js"]);
        assert_eq!(backend.calls_for(FIX_HEADING), 1);

        let fix = success.artifacts.iter().find(|a| a.path == "server.js").unwrap();
        assert_eq!(fix.stage, VALIDATOR_STAGE);

        // The review prompt carries the persisted file contents.
        assert!(backend.requests()[0].prompt.contains("app.get('/api/todos'"));
    }

    #[tokio::test]
    async fn test_unchanged_fix_is_not_a_fix() {
        let backend = ScriptedBackend::new()
            .on(REVIEW_HEADING, fixtures::CRITICAL_REVIEW)
            .on(FIX_HEADING, fixtures::BACKEND_RESPONSE);
        let ctx = context().build(VALIDATOR_STAGE).await;

        let success = ValidatorStage::new(Arc::new(backend)).execute(&ctx).await.unwrap();
        let validation = success.output.as_validation().unwrap();

        assert!(!validation.is_production_ready);
        assert!(validation.fixes.is_empty());
        assert_eq!(success.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_fix_failure_fails_stage() {
        let backend = ScriptedBackend::new()
            .on(REVIEW_HEADING, fixtures::CRITICAL_REVIEW)
            .on_error(FIX_HEADING, crate::errors::BackendError::api("overloaded"));
        let ctx = context().build(VALIDATOR_STAGE).await;

        let failure = ValidatorStage::new(Arc::new(backend)).execute(&ctx).await.unwrap_err();
        assert_eq!(failure.message, "fix generation failed: API error: overloaded");
    }

    #[tokio::test]
    async fn test_accepts_skipped_backend() {
        let backend = ScriptedBackend::new().on(REVIEW_HEADING, fixtures::CLEAN_REVIEW);
        let ctx = TestContext::new()
            .with_input(FRONTEND_STAGE, fixtures::frontend_output())
            .with_input(
                BACKEND_STAGE,
                StageOutput::Backend(BackendOutput::Skipped {
                    reason: "static".into(),
                }),
            )
            .build(VALIDATOR_STAGE)
            .await;

        let success = ValidatorStage::new(Arc::new(backend)).execute(&ctx).await.unwrap();
        assert!(success.output.as_validation().unwrap().is_production_ready);
    }

    #[test]
    fn test_render_lists_issues_and_fixes() {
        let issues = vec![ValidationIssue {
            severity: IssueSeverity::Critical,
            message: "secret in code".into(),
        }];
        let doc = render(&issues, &["server.js".to_string()], false);

        assert!(doc.contains("Production ready: no"));
        assert!(doc.contains("- **critical**: secret in code"));
        assert!(doc.contains("- `server.js`"));
    }
}
