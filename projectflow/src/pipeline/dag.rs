//! The validated stage graph.

use super::selector::{select_next, Selection};
use super::{StageDeclaration, StageSpec};
use crate::stages::Stage;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// An immutable, validated set of stages in declaration order.
///
/// Built by [`PipelineBuilder`](super::PipelineBuilder); every dependency
/// names a declared stage and the graph is acyclic.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    declarations: Vec<StageDeclaration>,
    runners: HashMap<String, Arc<dyn Stage>>,
}

impl Pipeline {
    pub(crate) fn new(name: String, specs: Vec<StageSpec>) -> Self {
        let mut declarations = Vec::with_capacity(specs.len());
        let mut runners = HashMap::with_capacity(specs.len());
        for spec in specs {
            runners.insert(spec.declaration.name.clone(), spec.runner);
            declarations.push(spec.declaration);
        }
        Self {
            name,
            declarations,
            runners,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declarations in configuration order.
    #[must_use]
    pub fn declarations(&self) -> &[StageDeclaration] {
        &self.declarations
    }

    /// Stage names in configuration order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.declarations.iter().map(|d| d.name.as_str())
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Returns the declaration of `stage`.
    #[must_use]
    pub fn declaration(&self, stage: &str) -> Option<&StageDeclaration> {
        self.declarations.iter().find(|d| d.name == stage)
    }

    /// Returns the implementation of `stage`.
    #[must_use]
    pub fn runner(&self, stage: &str) -> Option<Arc<dyn Stage>> {
        self.runners.get(stage).cloned()
    }

    /// Picks the next stage given the completed ones.
    #[must_use]
    pub fn select_next(&self, completed: &[String]) -> Selection {
        select_next(&self.declarations, completed)
    }

    /// All stages `stage` depends on, directly or through other stages.
    #[must_use]
    pub fn transitive_dependencies(&self, stage: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut pending: Vec<&str> = vec![stage];

        while let Some(current) = pending.pop() {
            if let Some(decl) = self.declaration(current) {
                for dep in &decl.dependencies {
                    if seen.insert(dep.clone()) {
                        pending.push(dep);
                    }
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineBuilder;
    use crate::testing::MockStage;

    fn standard() -> Pipeline {
        PipelineBuilder::new("test")
            .stage(Arc::new(MockStage::new("Requirement")), &[])
            .stage(Arc::new(MockStage::new("Frontend")), &["Requirement"])
            .stage(Arc::new(MockStage::new("Backend")), &["Requirement"])
            .stage(Arc::new(MockStage::new("Validator")), &["Frontend", "Backend"])
            .stage(Arc::new(MockStage::new("Deployment")), &["Validator"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_accessors() {
        let pipeline = standard();
        assert_eq!(pipeline.name(), "test");
        assert_eq!(pipeline.len(), 5);
        assert_eq!(
            pipeline.stage_names().collect::<Vec<_>>(),
            vec!["Requirement", "Frontend", "Backend", "Validator", "Deployment"]
        );
        assert!(pipeline.runner("Backend").is_some());
        assert!(pipeline.runner("Ghost").is_none());
    }

    #[test]
    fn test_transitive_dependencies() {
        let pipeline = standard();
        let deps: Vec<String> = pipeline.transitive_dependencies("Deployment").into_iter().collect();
        assert_eq!(deps, vec!["Backend", "Frontend", "Requirement", "Validator"]);
        assert!(pipeline.transitive_dependencies("Requirement").is_empty());
    }

    #[test]
    fn test_select_next_delegates() {
        let pipeline = standard();
        assert_eq!(pipeline.select_next(&[]), Selection::Ready("Requirement".into()));
    }
}
