//! Requirements analysis stage.

use super::parsing::extract_json_object;
use super::prompts::{requirements_prompt, truncate, REQUIREMENTS_SYSTEM};
use super::{Stage, StageContext, StageFailure, StageResult, StageSuccess, REQUIREMENT_STAGE};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::core::{GeneratedArtifact, LogLevel, RequirementsOutput, StageOutput, TechStack};
use crate::state::ProjectConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// Path of the requirements document artifact.
pub const REQUIREMENTS_DOC: &str = "docs/REQUIREMENTS.md";

const MAX_FALLBACK_SUMMARY: usize = 2_000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SuggestedRequirements {
    summary: Option<String>,
    features: Option<Vec<String>>,
    pages: Option<Vec<String>>,
    needs_backend: Option<bool>,
    needs_database: Option<bool>,
    needs_auth: Option<bool>,
    tech_stack: Option<SuggestedStack>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SuggestedStack {
    frontend: Option<String>,
    backend: Option<String>,
    database: Option<String>,
}

/// Turns the project description into [`RequirementsOutput`].
///
/// Explicit choices in the [`ProjectConfig`] win over what the model
/// suggests. When the response holds no usable JSON the stage still
/// succeeds, deriving flags from the configuration.
#[derive(Debug, Clone)]
pub struct RequirementStage {
    backend: Arc<dyn GenerationBackend>,
}

impl RequirementStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for RequirementStage {
    fn name(&self) -> &str {
        REQUIREMENT_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let config = ctx.config();
        ctx.log(LogLevel::Info, format!("Analyzing requirements for '{}'", config.name))
            .await;
        ctx.progress(10);

        let request = GenerationRequest::new(requirements_prompt(config))
            .with_system_instruction(REQUIREMENTS_SYSTEM);
        let response = self
            .backend
            .generate(request)
            .await
            .map_err(|e| StageFailure::backend("requirements analysis", &e))?;
        ctx.progress(70);

        let suggested = extract_json_object(&response.content)
            .and_then(|json| serde_json::from_str::<SuggestedRequirements>(json).ok());

        let requirements = match suggested {
            Some(suggested) => merge(config, suggested),
            None => {
                ctx.log(
                    LogLevel::Warn,
                    "Requirements response held no valid JSON; using the project configuration",
                )
                .await;
                fallback(config, &response.content)
            }
        };

        let document = GeneratedArtifact::new(ctx.stage(), REQUIREMENTS_DOC, render(config, &requirements));
        ctx.progress(90);
        ctx.log(
            LogLevel::Success,
            format!(
                "Requirements ready: {} features, backend {}",
                requirements.features.len(),
                if requirements.needs_backend { "required" } else { "not required" }
            ),
        )
        .await;

        Ok(StageSuccess::new(StageOutput::Requirements(requirements)).with_artifact(document))
    }
}

fn merge(config: &ProjectConfig, suggested: SuggestedRequirements) -> RequirementsOutput {
    let stack = suggested.tech_stack.unwrap_or_default();

    let needs_database = config.database.is_some() || suggested.needs_database.unwrap_or(false);
    let needs_backend = suggested
        .needs_backend
        .unwrap_or_else(|| config.needs_backend())
        || needs_database;
    let needs_auth = suggested.needs_auth.unwrap_or_else(|| mentions_auth(config));

    let summary = non_empty(suggested.summary).unwrap_or_else(|| default_summary(config));
    let features = suggested
        .features
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| config.features.clone());

    let frontend = config
        .frontend_framework
        .clone()
        .or_else(|| non_empty(stack.frontend))
        .unwrap_or_else(|| config.frontend_framework().to_string());
    let backend = needs_backend.then(|| {
        config
            .backend_framework
            .clone()
            .or_else(|| non_empty(stack.backend))
            .unwrap_or_else(|| config.backend_framework().to_string())
    });
    let database = if needs_database {
        config.database.clone().or_else(|| non_empty(stack.database))
    } else {
        None
    };

    RequirementsOutput {
        summary,
        features,
        pages: suggested.pages.unwrap_or_default(),
        needs_backend,
        needs_database,
        needs_auth,
        tech_stack: TechStack {
            frontend,
            backend,
            database,
        },
    }
}

fn fallback(config: &ProjectConfig, raw: &str) -> RequirementsOutput {
    let text = raw.trim();
    let summary = if text.is_empty() {
        default_summary(config)
    } else {
        truncate(text, MAX_FALLBACK_SUMMARY).to_string()
    };
    let needs_backend = config.needs_backend();

    RequirementsOutput {
        summary,
        features: config.features.clone(),
        pages: Vec::new(),
        needs_backend,
        needs_database: config.database.is_some(),
        needs_auth: mentions_auth(config),
        tech_stack: TechStack {
            frontend: config.frontend_framework().to_string(),
            backend: needs_backend.then(|| config.backend_framework().to_string()),
            database: config.database.clone(),
        },
    }
}

fn default_summary(config: &ProjectConfig) -> String {
    if config.description.trim().is_empty() {
        config.name.clone()
    } else {
        config.description.trim().to_string()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn mentions_auth(config: &ProjectConfig) -> bool {
    config.features.iter().any(|feature| {
        let feature = feature.to_ascii_lowercase();
        ["auth", "login", "sign in", "sign-in", "signup", "account"]
            .iter()
            .any(|kw| feature.contains(kw))
    })
}

fn render(config: &ProjectConfig, requirements: &RequirementsOutput) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "# {}\n\n{}\n", config.name, requirements.summary);

    doc.push_str("## Features\n\n");
    for feature in &requirements.features {
        let _ = writeln!(doc, "- {feature}");
    }

    if !requirements.pages.is_empty() {
        doc.push_str("\n## Pages\n\n");
        for page in &requirements.pages {
            let _ = writeln!(doc, "- {page}");
        }
    }

    let stack = &requirements.tech_stack;
    doc.push_str("\n## Architecture\n\n");
    let _ = writeln!(doc, "- Frontend: {}", stack.frontend);
    let _ = writeln!(doc, "- Backend: {}", stack.backend.as_deref().unwrap_or("none"));
    let _ = writeln!(doc, "- Database: {}", stack.database.as_deref().unwrap_or("none"));
    let _ = writeln!(
        doc,
        "- Authentication: {}",
        if requirements.needs_auth { "yes" } else { "no" }
    );
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BackendError;
    use crate::stages::prompts::REQUIREMENTS_HEADING;
    use crate::testing::{ScriptedBackend, TestContext};
    use pretty_assertions::assert_eq;

    fn stage(backend: ScriptedBackend) -> RequirementStage {
        RequirementStage::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn test_parses_embedded_json() {
        let backend = ScriptedBackend::new().on(
            REQUIREMENTS_HEADING,
            r#"Here is the analysis:
{"summary": "A todo app", "features": ["lists", "login"], "pages": ["Home"],
 "needs_backend": true, "needs_database": true, "needs_auth": true,
 "tech_stack": {"frontend": "svelte", "backend": "fastapi", "database": "postgres"}}"#,
        );
        let ctx = TestContext::new()
            .with_config(ProjectConfig::new("todo", "todos").with_frontend_framework("vue"))
            .build(REQUIREMENT_STAGE)
            .await;

        let success = stage(backend).execute(&ctx).await.unwrap();
        let requirements = success.output.as_requirements().unwrap();

        assert_eq!(requirements.summary, "A todo app");
        assert_eq!(requirements.features, vec!["lists", "login"]);
        assert!(requirements.needs_backend && requirements.needs_auth);
        assert_eq!(
            requirements.tech_stack,
            TechStack {
                frontend: "vue".into(),
                backend: Some("fastapi".into()),
                database: Some("postgres".into()),
            }
        );
        assert_eq!(success.artifacts.len(), 1);
        assert_eq!(success.artifacts[0].path, REQUIREMENTS_DOC);
        assert!(success.artifacts[0].content.contains("- Frontend: vue"));
    }

    #[tokio::test]
    async fn test_static_site_has_no_backend() {
        let backend = ScriptedBackend::new().on(
            REQUIREMENTS_HEADING,
            r#"{"summary": "Landing page", "needs_backend": false}"#,
        );
        let ctx = TestContext::new()
            .with_config(ProjectConfig::new("landing", "").with_feature("hero"))
            .build(REQUIREMENT_STAGE)
            .await;

        let success = stage(backend).execute(&ctx).await.unwrap();
        let requirements = success.output.as_requirements().unwrap();

        assert!(!requirements.needs_backend);
        assert_eq!(requirements.tech_stack.backend, None);
        assert_eq!(requirements.features, vec!["hero"]);
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back_to_config() {
        let backend = ScriptedBackend::new().on(REQUIREMENTS_HEADING, "I think you want a shop.");
        let ctx = TestContext::new()
            .with_config(
                ProjectConfig::new("shop", "online shop")
                    .with_feature("payments")
                    .with_database("mysql"),
            )
            .build(REQUIREMENT_STAGE)
            .await;

        let success = stage(backend).execute(&ctx).await.unwrap();
        let requirements = success.output.as_requirements().unwrap();

        assert_eq!(requirements.summary, "I think you want a shop.");
        assert!(requirements.needs_backend);
        assert!(requirements.needs_database);
        assert_eq!(requirements.tech_stack.database.as_deref(), Some("mysql"));

        let warnings = ctx.logs_at(LogLevel::Warn).await;
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_stage_failure() {
        let backend = ScriptedBackend::new().on_error(REQUIREMENTS_HEADING, BackendError::Timeout { seconds: 5 });
        let ctx = TestContext::new().build(REQUIREMENT_STAGE).await;

        let failure = stage(backend).execute(&ctx).await.unwrap_err();
        assert!(failure.message.starts_with("requirements analysis failed"));
    }
}
