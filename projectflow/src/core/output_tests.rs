//! Tests for the typed stage outputs.

#[cfg(test)]
mod tests {
    use crate::core::{
        BackendOutput, DeploymentOutput, FrontendOutput, IssueSeverity, RequirementsOutput,
        StageOutput, TechStack, ValidationIssue, ValidationOutput,
    };
    use pretty_assertions::assert_eq;

    fn validation(severities: &[IssueSeverity]) -> ValidationOutput {
        ValidationOutput {
            is_production_ready: !severities.contains(&IssueSeverity::Critical),
            issues: severities
                .iter()
                .map(|severity| ValidationIssue {
                    severity: *severity,
                    message: format!("{severity} finding"),
                })
                .collect(),
            fixes: Vec::new(),
            report: String::new(),
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(StageOutput::Requirements(RequirementsOutput::default()).kind(), "requirements");
        assert_eq!(StageOutput::Frontend(FrontendOutput::default()).kind(), "frontend");
        assert_eq!(
            StageOutput::Backend(BackendOutput::Skipped { reason: "static".into() }).kind(),
            "backend"
        );
        assert_eq!(StageOutput::Validation(ValidationOutput::default()).kind(), "validation");
        assert_eq!(StageOutput::Deployment(DeploymentOutput::default()).kind(), "deployment");
    }

    #[test]
    fn test_skipped_sentinel() {
        let skipped = StageOutput::Backend(BackendOutput::Skipped {
            reason: "no server features".into(),
        });
        let generated = StageOutput::Backend(BackendOutput::Generated {
            framework: "express".into(),
            files: vec!["server.js".into()],
            endpoints: Vec::new(),
        });

        assert!(skipped.is_skipped());
        assert!(!generated.is_skipped());
        assert!(skipped.as_backend().unwrap().files().is_empty());
        assert_eq!(generated.as_backend().unwrap().files(), ["server.js".to_string()]);
    }

    #[test]
    fn test_accessors_reject_other_variants() {
        let output = StageOutput::Frontend(FrontendOutput::default());

        assert!(output.as_frontend().is_some());
        assert!(output.as_requirements().is_none());
        assert!(output.as_backend().is_none());
        assert!(output.as_validation().is_none());
        assert!(output.as_deployment().is_none());
    }

    #[test]
    fn test_critical_count() {
        let output = validation(&[
            IssueSeverity::Critical,
            IssueSeverity::Warning,
            IssueSeverity::Critical,
            IssueSeverity::Info,
        ]);
        assert_eq!(output.critical_count(), 2);
        assert!(!output.is_production_ready);
    }

    #[test]
    fn test_tagged_serialization_shape() {
        let output = StageOutput::Backend(BackendOutput::Skipped {
            reason: "static site".into(),
        });
        let json = serde_json::to_value(&output).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "kind": "backend",
                "output": { "status": "skipped", "reason": "static site" }
            })
        );

        let back: StageOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back, output);
    }

    #[test]
    fn test_requirements_defaults_on_deserialize() {
        let json = serde_json::json!({
            "kind": "requirements",
            "output": { "summary": "todo app", "needs_backend": false }
        });
        let output: StageOutput = serde_json::from_value(json).unwrap();
        let requirements = output.as_requirements().unwrap();

        assert_eq!(requirements.summary, "todo app");
        assert!(requirements.features.is_empty());
        assert!(!requirements.needs_auth);
        assert_eq!(requirements.tech_stack, TechStack::default());
    }
}
