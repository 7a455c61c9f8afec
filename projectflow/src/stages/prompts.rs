//! Prompt construction for the generation stages.
//!
//! Every prompt starts with a `## Task:` heading so a scripted backend can
//! route requests without parsing the rest of the text.

use crate::core::{GeneratedArtifact, RequirementsOutput};
use crate::state::ProjectConfig;
use std::fmt::Write as _;

/// First line of the requirements analysis prompt.
pub const REQUIREMENTS_HEADING: &str = "## Task: requirements analysis";
/// First line of the frontend generation prompt.
pub const FRONTEND_HEADING: &str = "## Task: frontend generation";
/// First line of the backend generation prompt.
pub const BACKEND_HEADING: &str = "## Task: backend generation";
/// First line of the code review prompt.
pub const REVIEW_HEADING: &str = "## Task: code review";
/// First line of the fix prompt sent after critical findings.
pub const FIX_HEADING: &str = "## Task: fix critical issues";
/// First line of the deployment guide prompt.
pub const DEPLOYMENT_HEADING: &str = "## Task: deployment guide";

pub(crate) const REQUIREMENTS_SYSTEM: &str = "You are a senior product analyst. \
Answer with a single JSON object and nothing else.";

pub(crate) const CODEGEN_SYSTEM: &str = "You are a senior software engineer. \
Return every file as a fenced code block whose info string is the language followed by \
the relative file path, for example ```tsx src/App.tsx. Do not omit files.";

pub(crate) const REVIEW_SYSTEM: &str = "You are a meticulous code reviewer. \
Report each finding on its own line, prefixed with CRITICAL:, WARNING: or INFO:.";

pub(crate) const DEPLOYMENT_SYSTEM: &str = "You are a DevOps engineer writing concise, \
accurate operational documentation in Markdown.";

/// Longest file excerpt embedded in review and fix prompts.
const MAX_FILE_CHARS: usize = 6_000;

/// Builds the requirements analysis prompt.
#[must_use]
pub fn requirements_prompt(config: &ProjectConfig) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{REQUIREMENTS_HEADING}\n");
    write_project(&mut prompt, config);
    prompt.push_str(
        "\nReturn a JSON object with these keys:\n\
         - \"summary\": one paragraph describing the application\n\
         - \"features\": array of feature names\n\
         - \"pages\": array of page or screen names\n\
         - \"needs_backend\": boolean, true if a server is required\n\
         - \"needs_database\": boolean\n\
         - \"needs_auth\": boolean\n\
         - \"tech_stack\": object with \"frontend\", \"backend\" and \"database\" strings\n",
    );
    prompt
}

/// Builds the frontend generation prompt.
#[must_use]
pub fn frontend_prompt(config: &ProjectConfig, requirements: &RequirementsOutput, framework: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{FRONTEND_HEADING}\n");
    write_project(&mut prompt, config);
    write_requirements(&mut prompt, requirements);
    let _ = writeln!(
        prompt,
        "\nGenerate a complete {framework} frontend built with Vite. Include package.json, \
         index.html, an entry module and one component per page."
    );
    if requirements.needs_backend {
        prompt.push_str("Call the backend through relative `/api` URLs.\n");
    }
    prompt
}

/// Builds the backend generation prompt.
#[must_use]
pub fn backend_prompt(
    config: &ProjectConfig,
    requirements: &RequirementsOutput,
    framework: &str,
    database: Option<&str>,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{BACKEND_HEADING}\n");
    write_project(&mut prompt, config);
    write_requirements(&mut prompt, requirements);
    let _ = writeln!(
        prompt,
        "\nGenerate a complete {framework} API server. Prefix every route with `/api` and read \
         the port from the PORT environment variable."
    );
    if let Some(database) = database {
        let _ = writeln!(prompt, "Persist data in {database}; read the connection string from DATABASE_URL.");
    }
    if requirements.needs_auth {
        prompt.push_str("Protect user data with token authentication signed by JWT_SECRET.\n");
    }
    prompt
}

/// Builds the review prompt over the generated files.
#[must_use]
pub fn review_prompt(config: &ProjectConfig, files: &[&GeneratedArtifact]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{REVIEW_HEADING}\n");
    write_project(&mut prompt, config);
    prompt.push_str(
        "\nReview the files below for security problems, broken imports, missing files and \
         runtime errors. Mark anything that prevents the application from running safely as \
         CRITICAL.\n",
    );
    write_files(&mut prompt, files);
    prompt
}

/// Builds the prompt asking for corrected files.
#[must_use]
pub fn fix_prompt(report: &str, files: &[&GeneratedArtifact]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{FIX_HEADING}\n");
    prompt.push_str("A review found critical issues:\n\n");
    prompt.push_str(report.trim());
    prompt.push_str(
        "\n\nReturn the complete corrected version of every file you change, using the same \
         relative paths. Leave unaffected files out.\n",
    );
    write_files(&mut prompt, files);
    prompt
}

/// Builds the deployment guide prompt.
#[must_use]
pub fn deployment_prompt(config: &ProjectConfig, services: &[String], files: &[String]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{DEPLOYMENT_HEADING}\n");
    write_project(&mut prompt, config);
    let _ = writeln!(prompt, "\nServices: {}", services.join(", "));
    let _ = writeln!(prompt, "Deployment files: {}", files.join(", "));
    prompt.push_str(
        "\nWrite DEPLOYMENT.md covering local development, building the images, running \
         docker compose, required environment variables and production hardening.\n",
    );
    prompt
}

fn write_project(prompt: &mut String, config: &ProjectConfig) {
    let _ = writeln!(prompt, "Project: {}", config.name);
    if !config.description.trim().is_empty() {
        let _ = writeln!(prompt, "Description: {}", config.description.trim());
    }
    if !config.features.is_empty() {
        let _ = writeln!(prompt, "Requested features: {}", config.features.join(", "));
    }
}

fn write_requirements(prompt: &mut String, requirements: &RequirementsOutput) {
    let _ = writeln!(prompt, "\nRequirements summary: {}", requirements.summary);
    if !requirements.features.is_empty() {
        let _ = writeln!(prompt, "Features: {}", requirements.features.join(", "));
    }
    if !requirements.pages.is_empty() {
        let _ = writeln!(prompt, "Pages: {}", requirements.pages.join(", "));
    }
}

fn write_files(prompt: &mut String, files: &[&GeneratedArtifact]) {
    for file in files {
        let language = file.language.as_deref().unwrap_or("");
        let _ = writeln!(
            prompt,
            "\n```{language} {}\n{}\n```",
            file.path,
            truncate(&file.content, MAX_FILE_CHARS).trim_end()
        );
    }
}

/// Cuts `text` to at most `max` bytes on a character boundary.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}
