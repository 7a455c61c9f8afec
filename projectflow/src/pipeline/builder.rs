//! Pipeline builder with validation.

use super::{Pipeline, StageSpec};
use crate::backend::GenerationBackend;
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::stages::{
    BackendStage, DeploymentStage, FrontendStage, RequirementStage, Stage, ValidatorStage,
    BACKEND_STAGE, DEPLOYMENT_STAGE, FRONTEND_STAGE, REQUIREMENT_STAGE, VALIDATOR_STAGE,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Stages may be added in any order relative to their dependencies; all
/// checks run in [`build`](Self::build). The insertion order becomes the
/// configuration order the selector scans.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// The five generation stages wired to `backend`:
    /// Requirement, then Frontend and Backend, then Validator, then Deployment.
    #[must_use]
    pub fn standard(backend: Arc<dyn GenerationBackend>) -> Self {
        Self::new("standard")
            .stage(Arc::new(RequirementStage::new(backend.clone())), &[])
            .stage(Arc::new(FrontendStage::new(backend.clone())), &[REQUIREMENT_STAGE])
            .stage(Arc::new(BackendStage::new(backend.clone())), &[REQUIREMENT_STAGE])
            .stage(
                Arc::new(ValidatorStage::new(backend.clone())),
                &[FRONTEND_STAGE, BACKEND_STAGE],
            )
            .stage(Arc::new(DeploymentStage::new(backend)), &[VALIDATOR_STAGE])
    }

    /// Adds a stage under its own name.
    #[must_use]
    pub fn stage(self, runner: Arc<dyn Stage>, dependencies: &[&str]) -> Self {
        self.add(StageSpec::new(runner).with_dependencies(dependencies.iter().copied()))
    }

    /// Adds a stage under an explicit name.
    #[must_use]
    pub fn named_stage(
        self,
        name: impl Into<String>,
        runner: Arc<dyn Stage>,
        dependencies: &[&str],
    ) -> Self {
        self.add(StageSpec::named(name, runner).with_dependencies(dependencies.iter().copied()))
    }

    /// Adds a stage specification.
    #[must_use]
    pub fn add(mut self, spec: StageSpec) -> Self {
        self.stages.push(spec);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Rejects an empty pipeline, duplicate names, self-dependencies,
    /// unknown dependencies and cycles, each with its contract code.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage to the pipeline before building."),
                ));
        }

        let mut names = HashSet::new();
        for spec in &self.stages {
            spec.declaration.validate()?;
            if !names.insert(spec.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' is declared more than once",
                    spec.name()
                ))
                .with_stages(vec![spec.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONTRACT-004-DUPLICATE",
                        format!("Duplicate stage name '{}'", spec.name()),
                    )
                    .with_fix_hint("Give every stage a unique name."),
                ));
            }
        }

        for spec in &self.stages {
            if let Some(dep) = spec
                .declaration
                .dependencies
                .iter()
                .find(|dep| !names.contains(dep.as_str()))
            {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' depends on unknown stage '{}'",
                    spec.name(),
                    dep
                ))
                .with_stages(vec![spec.name().to_string(), dep.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONTRACT-004-MISSING_DEP",
                        format!("Dependency '{dep}' not found"),
                    )
                    .with_context_entry("stage", spec.name())
                    .with_fix_hint("Declare the dependency or remove it from the stage."),
                ));
            }
        }

        self.detect_cycles()?;

        Ok(Pipeline::new(self.name, self.stages))
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let graph: HashMap<&str, Vec<&str>> = self
            .stages
            .iter()
            .map(|spec| {
                (
                    spec.name(),
                    spec.declaration.dependencies.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for spec in &self.stages {
            if !visited.contains(spec.name()) {
                if let Some(cycle) = dfs_cycle(spec.name(), &graph, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }
}

fn dfs_cycle<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(deps) = graph.get(node) {
        for &dep in deps {
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(dep, graph, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStage, ScriptedBackend};
    use pretty_assertions::assert_eq;

    fn mock(name: &str) -> Arc<dyn Stage> {
        Arc::new(MockStage::new(name))
    }

    fn code(result: Result<Pipeline, PipelineValidationError>) -> String {
        result.unwrap_err().code().unwrap_or_default().to_string()
    }

    #[test]
    fn test_standard_pipeline() {
        let pipeline = PipelineBuilder::standard(Arc::new(ScriptedBackend::new()))
            .build()
            .unwrap();

        assert_eq!(pipeline.len(), 5);
        assert_eq!(
            pipeline.declaration(VALIDATOR_STAGE).unwrap().dependencies,
            vec![FRONTEND_STAGE, BACKEND_STAGE]
        );
        assert_eq!(
            pipeline.declaration(DEPLOYMENT_STAGE).unwrap().dependencies,
            vec![VALIDATOR_STAGE]
        );
    }

    #[test]
    fn test_empty_pipeline() {
        assert_eq!(code(PipelineBuilder::new("empty").build()), "CONTRACT-004-EMPTY");
    }

    #[test]
    fn test_duplicate_stage() {
        let result = PipelineBuilder::new("p")
            .stage(mock("a"), &[])
            .stage(mock("a"), &[])
            .build();
        assert_eq!(code(result), "CONTRACT-004-DUPLICATE");
    }

    #[test]
    fn test_self_dependency() {
        let result = PipelineBuilder::new("p").stage(mock("a"), &["a"]).build();
        assert_eq!(code(result), "CONTRACT-004-SELF_DEP");
    }

    #[test]
    fn test_missing_dependency() {
        let result = PipelineBuilder::new("p")
            .stage(mock("a"), &[])
            .stage(mock("b"), &["ghost"])
            .build();
        let err = result.unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-MISSING_DEP"));
        assert_eq!(err.stages, vec!["b", "ghost"]);
    }

    #[test]
    fn test_cycle_reports_path() {
        let result = PipelineBuilder::new("p")
            .stage(mock("a"), &["c"])
            .stage(mock("b"), &["a"])
            .stage(mock("c"), &["b"])
            .build();
        let err = result.unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-004-CYCLE"));
        assert_eq!(err.stages, vec!["a", "c", "b", "a"]);
    }

    #[test]
    fn test_forward_references_are_allowed() {
        let pipeline = PipelineBuilder::new("p")
            .stage(mock("late"), &["early"])
            .stage(mock("early"), &[])
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_names().collect::<Vec<_>>(), vec!["late", "early"]);
    }

    #[test]
    fn test_named_stage() {
        let pipeline = PipelineBuilder::new("p")
            .named_stage("alias", mock("inner"), &[])
            .build()
            .unwrap();
        assert!(pipeline.runner("alias").is_some());
    }
}
