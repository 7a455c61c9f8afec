//! Next-stage selection.

use super::StageDeclaration;
use serde::{Deserialize, Serialize};

/// Outcome of [`select_next`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// This stage may run now.
    Ready(String),
    /// Every declared stage is completed.
    AllComplete,
    /// Stages remain but none has its dependencies satisfied.
    Blocked {
        /// Declared stages not yet completed, in declaration order.
        remaining: Vec<String>,
    },
}

/// Picks the next stage to run.
///
/// Declarations are scanned in order; the first uncompleted one whose
/// dependencies are all in `completed` wins. The result depends only on the
/// inputs, so a resumed run re-derives the same order. Completed names that
/// are not declared are ignored.
#[must_use]
pub fn select_next(declarations: &[StageDeclaration], completed: &[String]) -> Selection {
    let mut remaining = Vec::new();

    for decl in declarations {
        if completed.contains(&decl.name) {
            continue;
        }
        if decl.is_ready(completed) {
            return Selection::Ready(decl.name.clone());
        }
        remaining.push(decl.name.clone());
    }

    if remaining.is_empty() {
        Selection::AllComplete
    } else {
        Selection::Blocked { remaining }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn standard() -> Vec<StageDeclaration> {
        vec![
            StageDeclaration::new("Requirement"),
            StageDeclaration::new("Frontend").with_dependency("Requirement"),
            StageDeclaration::new("Backend").with_dependency("Requirement"),
            StageDeclaration::new("Validator").with_dependencies(["Frontend", "Backend"]),
            StageDeclaration::new("Deployment").with_dependency("Validator"),
        ]
    }

    fn completed(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_walks_the_standard_chain() {
        let decls = standard();
        let mut done = Vec::new();
        let mut order = Vec::new();

        while let Selection::Ready(name) = select_next(&decls, &done) {
            order.push(name.clone());
            done.push(name);
        }

        assert_eq!(
            order,
            vec!["Requirement", "Frontend", "Backend", "Validator", "Deployment"]
        );
        assert_eq!(select_next(&decls, &done), Selection::AllComplete);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let decls = standard();
        assert_eq!(
            select_next(&decls, &completed(&["Requirement"])),
            Selection::Ready("Frontend".into())
        );
        assert_eq!(
            select_next(&decls, &completed(&["Requirement", "Frontend"])),
            Selection::Ready("Backend".into())
        );
    }

    #[test]
    fn test_replay_is_deterministic() {
        let decls = standard();
        let done = completed(&["Requirement", "Backend"]);
        let first = select_next(&decls, &done);
        for _ in 0..10 {
            assert_eq!(select_next(&decls, &done), first);
        }
    }

    #[test]
    fn test_blocked_reports_remaining() {
        let decls = vec![
            StageDeclaration::new("a"),
            StageDeclaration::new("b").with_dependency("ghost"),
        ];
        assert_eq!(
            select_next(&decls, &completed(&["a"])),
            Selection::Blocked {
                remaining: vec!["b".into()]
            }
        );
    }

    #[test]
    fn test_foreign_completed_names_are_ignored() {
        let decls = standard();
        let done = completed(&["Requirement", "Legacy", "Frontend", "Backend", "Validator", "Deployment"]);
        assert_eq!(select_next(&decls, &done), Selection::AllComplete);
    }

    #[test]
    fn test_empty_declarations_are_complete() {
        assert_eq!(select_next(&[], &[]), Selection::AllComplete);
    }
}
