//! Typed stage outputs.
//!
//! Every generation stage produces exactly one variant of [`StageOutput`].
//! Downstream stages pattern-match on the variant they expect instead of
//! digging through untyped maps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The structured output of a successful stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "output", rename_all = "snake_case")]
pub enum StageOutput {
    /// Requirements analysis.
    Requirements(RequirementsOutput),
    /// Frontend generation.
    Frontend(FrontendOutput),
    /// Backend generation, possibly skipped.
    Backend(BackendOutput),
    /// Validation of the generated code.
    Validation(ValidationOutput),
    /// Deployment packaging.
    Deployment(DeploymentOutput),
}

impl StageOutput {
    /// Returns the variant name, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Requirements(_) => "requirements",
            Self::Frontend(_) => "frontend",
            Self::Backend(_) => "backend",
            Self::Validation(_) => "validation",
            Self::Deployment(_) => "deployment",
        }
    }

    /// Returns true for the backend "not needed" sentinel.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Backend(BackendOutput::Skipped { .. }))
    }

    /// Returns the requirements output, if this is one.
    #[must_use]
    pub fn as_requirements(&self) -> Option<&RequirementsOutput> {
        match self {
            Self::Requirements(output) => Some(output),
            _ => None,
        }
    }

    /// Returns the frontend output, if this is one.
    #[must_use]
    pub fn as_frontend(&self) -> Option<&FrontendOutput> {
        match self {
            Self::Frontend(output) => Some(output),
            _ => None,
        }
    }

    /// Returns the backend output, if this is one.
    #[must_use]
    pub fn as_backend(&self) -> Option<&BackendOutput> {
        match self {
            Self::Backend(output) => Some(output),
            _ => None,
        }
    }

    /// Returns the validation output, if this is one.
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationOutput> {
        match self {
            Self::Validation(output) => Some(output),
            _ => None,
        }
    }

    /// Returns the deployment output, if this is one.
    #[must_use]
    pub fn as_deployment(&self) -> Option<&DeploymentOutput> {
        match self {
            Self::Deployment(output) => Some(output),
            _ => None,
        }
    }
}

/// Technology choices carried from requirements to the generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TechStack {
    /// Frontend framework (e.g. "react").
    pub frontend: String,
    /// Backend framework (e.g. "express"), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Database, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Result of the requirements analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequirementsOutput {
    /// One-paragraph description of what will be built.
    pub summary: String,
    /// Feature list.
    #[serde(default)]
    pub features: Vec<String>,
    /// Pages or screens of the frontend.
    #[serde(default)]
    pub pages: Vec<String>,
    /// Whether a server component is required at all.
    pub needs_backend: bool,
    /// Whether persistent storage is required.
    #[serde(default)]
    pub needs_database: bool,
    /// Whether user authentication is required.
    #[serde(default)]
    pub needs_auth: bool,
    /// Selected technologies.
    #[serde(default)]
    pub tech_stack: TechStack,
}

/// Result of the frontend generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FrontendOutput {
    /// Framework the files were generated for.
    pub framework: String,
    /// Paths of generated files.
    pub files: Vec<String>,
    /// Entry point among `files`, if one was recognised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

/// Result of the backend generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendOutput {
    /// Backend files were generated.
    Generated {
        /// Framework the files were generated for.
        framework: String,
        /// Paths of generated files.
        files: Vec<String>,
        /// HTTP routes found in the generated code (`GET /api/items`).
        #[serde(default)]
        endpoints: Vec<String>,
    },
    /// The project needs no backend; the stage ran and produced nothing.
    Skipped {
        /// Why the backend was not generated.
        reason: String,
    },
}

impl BackendOutput {
    /// Returns the generated file paths (empty when skipped).
    #[must_use]
    pub fn files(&self) -> &[String] {
        match self {
            Self::Generated { files, .. } => files,
            Self::Skipped { .. } => &[],
        }
    }
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Blocks production use.
    Critical,
    /// Should be fixed.
    Warning,
    /// Advisory.
    Info,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Severity.
    pub severity: IssueSeverity,
    /// Human-readable description.
    pub message: String,
}

/// Result of the validation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationOutput {
    /// False when at least one critical issue was found.
    pub is_production_ready: bool,
    /// All findings, in report order.
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
    /// Paths of corrective artifacts written by the stage.
    #[serde(default)]
    pub fixes: Vec<String>,
    /// The raw review report.
    pub report: String,
}

impl ValidationOutput {
    /// Number of critical findings.
    #[must_use]
    pub fn critical_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Critical)
            .count()
    }
}

/// Result of the deployment packaging stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeploymentOutput {
    /// Paths of deployment files.
    pub files: Vec<String>,
    /// Services declared in the compose file.
    pub services: Vec<String>,
    /// Copied from the validation result.
    pub production_ready: bool,
}
