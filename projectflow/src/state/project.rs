//! User-supplied project configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Framework used when the configuration names none.
pub const DEFAULT_FRONTEND_FRAMEWORK: &str = "react";
/// Backend framework used when the configuration names none.
pub const DEFAULT_BACKEND_FRAMEWORK: &str = "express";

const BACKEND_KEYWORDS: [&str; 7] = [
    "auth", "login", "database", "api", "storage", "payment", "account",
];

/// The configuration a run is created with. Immutable for the run's lifetime.
///
/// Unknown keys are kept in `extra` so that documents produced by newer
/// clients survive a round trip through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    /// Project name.
    pub name: String,
    /// Free-form description of what to build.
    #[serde(default)]
    pub description: String,
    /// Requested features.
    #[serde(default)]
    pub features: Vec<String>,
    /// Preferred frontend framework.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_framework: Option<String>,
    /// Preferred backend framework.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_framework: Option<String>,
    /// Preferred database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProjectConfig {
    /// Creates a configuration with a name and description.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Adds a feature.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    /// Sets the frontend framework.
    #[must_use]
    pub fn with_frontend_framework(mut self, framework: impl Into<String>) -> Self {
        self.frontend_framework = Some(framework.into());
        self
    }

    /// Sets the backend framework.
    #[must_use]
    pub fn with_backend_framework(mut self, framework: impl Into<String>) -> Self {
        self.backend_framework = Some(framework.into());
        self
    }

    /// Sets the database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Frontend framework, or the default.
    #[must_use]
    pub fn frontend_framework(&self) -> &str {
        self.frontend_framework
            .as_deref()
            .unwrap_or(DEFAULT_FRONTEND_FRAMEWORK)
    }

    /// Backend framework, or the default.
    #[must_use]
    pub fn backend_framework(&self) -> &str {
        self.backend_framework
            .as_deref()
            .unwrap_or(DEFAULT_BACKEND_FRAMEWORK)
    }

    /// True when the configuration on its own calls for a server.
    ///
    /// A database or an explicit backend framework always does; otherwise a
    /// feature must contain a word starting with one of the backend keywords
    /// (`auth`, `login`, `database`, `api`, `storage`, `payment`, `account`).
    #[must_use]
    pub fn needs_backend(&self) -> bool {
        if self.database.is_some() || self.backend_framework.is_some() {
            return true;
        }
        self.features.iter().any(|feature| mentions_backend(feature))
    }
}

fn mentions_backend(feature: &str) -> bool {
    feature
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| BACKEND_KEYWORDS.iter().any(|kw| word.starts_with(kw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_site_needs_no_backend() {
        let config = ProjectConfig::new("landing", "marketing page")
            .with_feature("hero section")
            .with_feature("rapid prototyping");
        assert!(!config.needs_backend());
    }

    #[test]
    fn test_keywords_trigger_backend() {
        for feature in ["User Authentication", "REST APIs", "file-storage", "accounts page"] {
            let config = ProjectConfig::new("app", "").with_feature(feature);
            assert!(config.needs_backend(), "{feature}");
        }
    }

    #[test]
    fn test_database_triggers_backend() {
        let config = ProjectConfig::new("app", "").with_database("postgres");
        assert!(config.needs_backend());
    }

    #[test]
    fn test_framework_defaults() {
        let config = ProjectConfig::new("app", "");
        assert_eq!(config.frontend_framework(), "react");
        assert_eq!(config.backend_framework(), "express");

        let config = config.with_frontend_framework("vue");
        assert_eq!(config.frontend_framework(), "vue");
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let json = serde_json::json!({
            "name": "shop",
            "features": ["cart"],
            "theme": {"primary": "#333"}
        });
        let config: ProjectConfig = serde_json::from_value(json.clone()).unwrap();

        assert_eq!(config.extra.get("theme"), Some(&json["theme"]));
        assert_eq!(serde_json::to_value(&config).unwrap(), {
            let mut expected = json;
            expected["description"] = serde_json::json!("");
            expected
        });
    }
}
