//! Canned responses, outputs and a stage-context harness.

use super::ScriptedBackend;
use crate::core::{
    BackendOutput, DeploymentOutput, FrontendOutput, GeneratedArtifact, IssueSeverity, LogLevel,
    RequirementsOutput, StageOutput, TechStack, ValidationIssue, ValidationOutput,
};
use crate::events::{EventChannel, EventFilter, EventSubscription};
use crate::stages::parsing::extract_artifacts;
use crate::stages::prompts::{
    BACKEND_HEADING, DEPLOYMENT_HEADING, FIX_HEADING, FRONTEND_HEADING, REQUIREMENTS_HEADING,
    REVIEW_HEADING,
};
use crate::stages::{
    StageContext, StageInputs, StageReporter, BACKEND_STAGE, DEPLOYMENT_STAGE, FRONTEND_STAGE,
    REQUIREMENT_STAGE, VALIDATOR_STAGE,
};
use crate::state::{LogEntry, ProjectConfig, ProjectRun};
use crate::store::{InMemoryProjectStore, ProjectStore};
use std::ops::Deref;
use std::sync::Arc;

/// Requirements analysis answer for [`sample_config`].
pub const REQUIREMENTS_RESPONSE: &str = r#"Here is my analysis.

```json
{
  "summary": "A collaborative todo list where signed-in users share lists.",
  "features": ["user accounts", "shared lists", "due dates"],
  "pages": ["Login", "Lists", "List detail"],
  "needs_backend": true,
  "needs_database": true,
  "needs_auth": true,
  "tech_stack": {"frontend": "react", "backend": "express", "database": "postgres"}
}
```
"#;

/// Requirements analysis answer for [`static_site_config`].
pub const STATIC_REQUIREMENTS_RESPONSE: &str = r#"{
  "summary": "A single marketing page with a hero section.",
  "features": ["hero section"],
  "pages": ["Home"],
  "needs_backend": false,
  "tech_stack": {"frontend": "react"}
}"#;

/// Frontend generation answer: four files, entry point `src/main.tsx`.
pub const FRONTEND_RESPONSE: &str = r#"The React frontend:

```html index.html
<!doctype html>
<html>
  <body><div id="root"></div><script type="module" src="/src/main.tsx"></script></body>
</html>
```

```tsx src/main.tsx
import { createRoot } from 'react-dom/client';
import App from './App';

createRoot(document.getElementById('root')!).render(<App />);
```

File: src/App.tsx
```tsx
export default function App() {
  return <h1>Todos</h1>;
}
```

```ts vite.config.ts
import { defineConfig } from 'vite';
export default defineConfig({});
```
"#;

/// Backend generation answer: `package.json` and `server.js` with two routes.
pub const BACKEND_RESPONSE: &str = r#"An Express server:

```json package.json
{ "name": "todo-api", "main": "server.js", "dependencies": { "express": "^4.19.0" } }
```

```js server.js
const express = require('express');
const app = express();
app.use(express.json());

const todos = [];
app.get('/api/todos', (req, res) => res.json(todos));
app.post('/api/todos', (req, res) => {
  todos.push(req.body);
  res.status(201).json(req.body);
});

app.listen(process.env.PORT || 3000);
```
"#;

/// Review without critical findings.
pub const CLEAN_REVIEW: &str = "The code is in reasonable shape.

- **WARNING**: src/App.tsx does not handle fetch errors
- INFO: consider adding tests
";

/// Review with exactly one critical finding.
pub const CRITICAL_REVIEW: &str = "Critical issues found below.

- **CRITICAL**: server.js accepts unvalidated request bodies on POST /api/todos
- **WARNING**: src/App.tsx does not handle fetch errors
";

/// Fix answer replacing `server.js`.
pub const FIX_RESPONSE: &str = r#"Corrected file:

```js server.js
const express = require('express');
const app = express();
app.use(express.json());

const todos = [];
app.get('/api/todos', (req, res) => res.json(todos));
app.post('/api/todos', (req, res) => {
  if (typeof req.body?.title !== 'string') {
    return res.status(400).json({ error: 'title is required' });
  }
  todos.push({ title: req.body.title });
  res.status(201).json({ title: req.body.title });
});

app.listen(process.env.PORT || 3000);
```
"#;

/// Deployment guide answer.
pub const DEPLOYMENT_GUIDE: &str = "# Deployment

1. Copy `.env.example` to `.env`.
2. Run `docker compose up --build`.
";

/// A full-stack project with a database.
#[must_use]
pub fn sample_config() -> ProjectConfig {
    ProjectConfig::new("todo-app", "A collaborative todo list")
        .with_feature("user accounts")
        .with_feature("shared lists")
        .with_database("postgres")
}

/// A static site that needs no server.
#[must_use]
pub fn static_site_config() -> ProjectConfig {
    ProjectConfig::new("landing", "A marketing page").with_feature("hero section")
}

/// A backend scripted for a clean run of the five standard stages.
#[must_use]
pub fn scripted_backend() -> ScriptedBackend {
    ScriptedBackend::new()
        .on(REQUIREMENTS_HEADING, REQUIREMENTS_RESPONSE)
        .on(FRONTEND_HEADING, FRONTEND_RESPONSE)
        .on(BACKEND_HEADING, BACKEND_RESPONSE)
        .on(REVIEW_HEADING, CLEAN_REVIEW)
        .on(DEPLOYMENT_HEADING, DEPLOYMENT_GUIDE)
}

/// Like [`scripted_backend`], but the review finds a critical issue and
/// the fix replaces `server.js`.
#[must_use]
pub fn scripted_backend_with_fixes() -> ScriptedBackend {
    ScriptedBackend::new()
        .on(REQUIREMENTS_HEADING, REQUIREMENTS_RESPONSE)
        .on(FRONTEND_HEADING, FRONTEND_RESPONSE)
        .on(BACKEND_HEADING, BACKEND_RESPONSE)
        .on(REVIEW_HEADING, CRITICAL_REVIEW)
        .on(FIX_HEADING, FIX_RESPONSE)
        .on(DEPLOYMENT_HEADING, DEPLOYMENT_GUIDE)
}

/// Requirements output, with or without a server.
#[must_use]
pub fn requirements_output(needs_backend: bool) -> StageOutput {
    StageOutput::Requirements(RequirementsOutput {
        summary: "A collaborative todo list".to_string(),
        features: vec!["user accounts".to_string(), "shared lists".to_string()],
        pages: vec!["Lists".to_string()],
        needs_backend,
        needs_database: false,
        needs_auth: needs_backend,
        tech_stack: TechStack {
            frontend: "react".to_string(),
            backend: needs_backend.then(|| "express".to_string()),
            database: None,
        },
    })
}

/// Frontend output matching [`FRONTEND_RESPONSE`].
#[must_use]
pub fn frontend_output() -> StageOutput {
    StageOutput::Frontend(FrontendOutput {
        framework: "react".to_string(),
        files: extract_artifacts(FRONTEND_STAGE, FRONTEND_RESPONSE)
            .into_iter()
            .map(|a| a.path)
            .collect(),
        entry_point: Some("src/main.tsx".to_string()),
    })
}

/// Backend output matching [`BACKEND_RESPONSE`].
#[must_use]
pub fn backend_output() -> StageOutput {
    StageOutput::Backend(BackendOutput::Generated {
        framework: "express".to_string(),
        files: vec!["package.json".to_string(), "server.js".to_string()],
        endpoints: vec!["GET /api/todos".to_string(), "POST /api/todos".to_string()],
    })
}

/// Validation output without fixes.
#[must_use]
pub fn validation_output(production_ready: bool) -> StageOutput {
    let issues = if production_ready {
        Vec::new()
    } else {
        vec![ValidationIssue {
            severity: IssueSeverity::Critical,
            message: "unvalidated input".to_string(),
        }]
    };
    StageOutput::Validation(ValidationOutput {
        is_production_ready: production_ready,
        issues,
        ..ValidationOutput::default()
    })
}

/// Deployment output for a full-stack project.
#[must_use]
pub fn deployment_output() -> StageOutput {
    StageOutput::Deployment(DeploymentOutput {
        files: vec!["Dockerfile".to_string(), "docker-compose.yml".to_string()],
        services: vec!["frontend".to_string(), "backend".to_string()],
        production_ready: true,
    })
}

/// The fixture output a stage named `stage` would produce.
///
/// Unknown names get a requirements output whose summary names the stage.
#[must_use]
pub fn output_for(stage: &str) -> StageOutput {
    match stage {
        REQUIREMENT_STAGE => requirements_output(true),
        FRONTEND_STAGE => frontend_output(),
        BACKEND_STAGE => backend_output(),
        VALIDATOR_STAGE => validation_output(true),
        DEPLOYMENT_STAGE => deployment_output(),
        other => StageOutput::Requirements(RequirementsOutput {
            summary: format!("{other} output"),
            ..RequirementsOutput::default()
        }),
    }
}

/// Artifacts the frontend and backend stages persist for the fixture
/// responses.
#[must_use]
pub fn generated_files() -> Vec<GeneratedArtifact> {
    let mut files = extract_artifacts(FRONTEND_STAGE, FRONTEND_RESPONSE);
    files.extend(extract_artifacts(BACKEND_STAGE, BACKEND_RESPONSE));
    files
}

/// Builder for a [`StageContext`] backed by a fresh in-memory run.
#[derive(Debug, Clone)]
pub struct TestContext {
    config: ProjectConfig,
    inputs: StageInputs,
    artifacts: Vec<GeneratedArtifact>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            config: ProjectConfig::new("test-project", "A project used in tests"),
            inputs: StageInputs::default(),
            artifacts: Vec::new(),
        }
    }
}

impl TestContext {
    /// Creates a builder for the default `test-project` configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project configuration.
    #[must_use]
    pub fn with_config(mut self, config: ProjectConfig) -> Self {
        self.config = config;
        self
    }

    /// Makes `output` visible as the output of `stage`.
    #[must_use]
    pub fn with_input(mut self, stage: &str, output: StageOutput) -> Self {
        self.inputs = self.inputs.with_output(stage, output);
        self
    }

    /// Sets the artifacts already persisted for the run.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<GeneratedArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Persists the run and builds the context for `stage`.
    #[allow(clippy::expect_used)]
    pub async fn build(self, stage: &str) -> StageHarness {
        let store = InMemoryProjectStore::new();
        let run = ProjectRun::new(self.config.clone());
        store
            .create_run(&run)
            .await
            .expect("a fresh in-memory store accepts a new run");
        for artifact in &self.artifacts {
            store
                .upsert_artifact(&run.id, artifact)
                .await
                .expect("the run was just created");
        }

        let events = EventChannel::new(64);
        let reporter = StageReporter::new(
            &run.id,
            stage,
            Arc::new(store.clone()) as Arc<dyn ProjectStore>,
            events.clone(),
        );
        let ctx = StageContext::new(&run.id, stage, Arc::new(self.config), self.inputs, reporter)
            .with_artifacts(self.artifacts);

        StageHarness { ctx, store, events }
    }
}

/// A built stage context plus the store and channel behind it.
///
/// Derefs to [`StageContext`], so it can be passed straight to
/// `Stage::execute`.
#[derive(Debug)]
pub struct StageHarness {
    ctx: StageContext,
    store: InMemoryProjectStore,
    events: EventChannel,
}

impl StageHarness {
    /// The store holding the run.
    #[must_use]
    pub fn store(&self) -> &InMemoryProjectStore {
        &self.store
    }

    /// Subscribes to events of this run.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe(EventFilter::Run(self.ctx.run_id().to_string()))
    }

    /// Log entries written so far.
    #[allow(clippy::expect_used)]
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.store
            .list_logs(self.ctx.run_id())
            .await
            .expect("the run exists")
    }

    /// Log entries written at `level`.
    pub async fn logs_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.logs()
            .await
            .into_iter()
            .filter(|entry| entry.level == level)
            .collect()
    }
}

impl Deref for StageHarness {
    type Target = StageContext;

    fn deref(&self) -> &StageContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::parsing::{extract_endpoints, parse_issues};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_responses_parse_as_expected() {
        let frontend: Vec<String> = extract_artifacts(FRONTEND_STAGE, FRONTEND_RESPONSE)
            .into_iter()
            .map(|a| a.path)
            .collect();
        assert_eq!(frontend, vec!["index.html", "src/main.tsx", "src/App.tsx", "vite.config.ts"]);

        let backend = extract_artifacts(BACKEND_STAGE, BACKEND_RESPONSE);
        assert_eq!(
            extract_endpoints(backend.iter().map(|a| a.content.as_str())),
            vec!["GET /api/todos", "POST /api/todos"]
        );

        let critical = parse_issues(CRITICAL_REVIEW)
            .into_iter()
            .filter(|i| i.severity == IssueSeverity::Critical)
            .count();
        assert_eq!(critical, 1);
        assert!(parse_issues(CLEAN_REVIEW)
            .iter()
            .all(|i| i.severity != IssueSeverity::Critical));
    }

    #[tokio::test]
    async fn test_harness_persists_artifacts() {
        let ctx = TestContext::new()
            .with_artifacts(generated_files())
            .build(VALIDATOR_STAGE)
            .await;

        assert_eq!(ctx.config().name, "test-project");
        assert_eq!(ctx.stage(), VALIDATOR_STAGE);
        assert!(ctx.artifact("server.js").is_some());
        let stored = ctx.store().list_artifacts(ctx.run_id()).await.unwrap();
        assert_eq!(stored.len(), ctx.artifacts().len());
    }

    #[tokio::test]
    async fn test_harness_collects_logs() {
        let ctx = TestContext::new().build("custom").await;
        ctx.log(LogLevel::Warn, "careful").await;
        ctx.log(LogLevel::Info, "fine").await;

        assert_eq!(ctx.logs().await.len(), 2);
        assert_eq!(ctx.logs_at(LogLevel::Warn).await[0].message, "careful");
    }
}
