//! Stage declarations and specifications.

use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stage name with the names it depends on. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDeclaration {
    /// The unique name of the stage.
    pub name: String,
    /// Names of stages this stage depends on, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl StageDeclaration {
    /// Creates a declaration without dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Sets the dependencies, dropping repeats.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies.clear();
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Returns true if every dependency is in `completed`.
    #[must_use]
    pub fn is_ready(&self, completed: &[String]) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Validates the declaration on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage depends on itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-EMPTY_NAME", "Stage has a blank name")
                        .with_fix_hint("Give every stage a non-empty name."),
                ));
        }
        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-004-SELF_DEP",
                    format!("Stage '{}' lists itself as a dependency", self.name),
                )
                .with_fix_hint("Remove the stage from its own dependency list."),
            ));
        }
        Ok(())
    }
}

/// A declaration paired with the stage that implements it.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The declaration.
    pub declaration: StageDeclaration,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
}

impl StageSpec {
    /// Creates a specification declared under the runner's own name.
    #[must_use]
    pub fn new(runner: Arc<dyn Stage>) -> Self {
        Self {
            declaration: StageDeclaration::new(runner.name()),
            runner,
        }
    }

    /// Creates a specification under an explicit name.
    #[must_use]
    pub fn named(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            declaration: StageDeclaration::new(name),
            runner,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.declaration = self.declaration.with_dependencies(deps);
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.declaration = self.declaration.with_dependency(dep);
        self
    }

    /// The declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.declaration.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStage;

    #[test]
    fn test_dependencies_are_deduplicated() {
        let decl = StageDeclaration::new("Validator")
            .with_dependencies(["Frontend", "Backend", "Frontend"]);
        assert_eq!(decl.dependencies, vec!["Frontend", "Backend"]);
    }

    #[test]
    fn test_is_ready() {
        let decl = StageDeclaration::new("Validator").with_dependencies(["Frontend", "Backend"]);
        assert!(!decl.is_ready(&["Frontend".to_string()]));
        assert!(decl.is_ready(&["Backend".to_string(), "Frontend".to_string()]));
        assert!(StageDeclaration::new("Requirement").is_ready(&[]));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = StageDeclaration::new("a").with_dependency("a").validate().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-SELF_DEP"));
    }

    #[test]
    fn test_spec_uses_runner_name() {
        let spec = StageSpec::new(Arc::new(MockStage::new("Frontend"))).with_dependency("Requirement");
        assert_eq!(spec.name(), "Frontend");
        assert_eq!(spec.declaration.dependencies, vec!["Requirement"]);
    }

    #[test]
    fn test_declaration_serde() {
        let decl: StageDeclaration = serde_json::from_str(r#"{"name": "Requirement"}"#).unwrap();
        assert!(decl.dependencies.is_empty());
    }
}
