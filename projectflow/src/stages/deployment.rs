//! Deployment packaging stage.
//!
//! Container files are derived from the earlier outputs without a backend
//! call; only the human-readable guide is generated.

use super::prompts::{deployment_prompt, DEPLOYMENT_SYSTEM};
use super::{Stage, StageContext, StageFailure, StageResult, StageSuccess, DEPLOYMENT_STAGE};
use crate::backend::{GenerationBackend, GenerationRequest};
use crate::core::{BackendOutput, DeploymentOutput, GeneratedArtifact, LogLevel, StageOutput};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

/// Frontend image definition.
pub const FRONTEND_DOCKERFILE: &str = "Dockerfile";
/// Backend image definition, written only for generated backends.
pub const BACKEND_DOCKERFILE: &str = "Dockerfile.backend";
/// Compose file tying the services together.
pub const COMPOSE_FILE: &str = "docker-compose.yml";
/// Environment template.
pub const ENV_TEMPLATE: &str = ".env.example";
/// Generated operations guide.
pub const DEPLOYMENT_GUIDE: &str = "DEPLOYMENT.md";

const NODE_ENTRIES: [&str; 8] = [
    "server.js",
    "index.js",
    "app.js",
    "src/server.js",
    "src/index.js",
    "src/app.js",
    "server/index.js",
    "backend/server.js",
];

const PYTHON_ENTRIES: [&str; 5] = ["main.py", "app.py", "app/main.py", "src/main.py", "backend/main.py"];

const PYTHON_FRAMEWORKS: [&str; 4] = ["fastapi", "flask", "django", "python"];

/// Container runtime of the generated backend.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Runtime {
    Node { entry: String },
    Python { entry: String, asgi: bool },
}

impl Runtime {
    fn detect(framework: &str, files: &[String]) -> Self {
        let framework = framework.to_ascii_lowercase();
        if PYTHON_FRAMEWORKS.iter().any(|f| framework.contains(f)) {
            let entry = pick_entry(&PYTHON_ENTRIES, files, ".py", "main.py");
            Self::Python {
                entry,
                asgi: framework.contains("fastapi"),
            }
        } else {
            Self::Node {
                entry: pick_entry(&NODE_ENTRIES, files, ".js", "server.js"),
            }
        }
    }

    fn port(&self) -> u16 {
        match self {
            Self::Node { .. } => 3000,
            Self::Python { .. } => 8000,
        }
    }

    fn dockerfile(&self) -> String {
        match self {
            Self::Node { entry } => format!(
                "FROM node:20-alpine\n\
                 WORKDIR /app\n\
                 COPY package*.json ./\n\
                 RUN npm ci --omit=dev\n\
                 COPY . .\n\
                 ENV NODE_ENV=production\n\
                 EXPOSE {port}\n\
                 CMD [\"node\", \"{entry}\"]\n",
                port = self.port(),
            ),
            Self::Python { entry, asgi } => {
                let command = if *asgi {
                    let module = entry.trim_end_matches(".py").replace('/', ".");
                    format!(
                        "[\"uvicorn\", \"{module}:app\", \"--host\", \"0.0.0.0\", \"--port\", \"{}\"]",
                        self.port()
                    )
                } else {
                    format!("[\"python\", \"{entry}\"]")
                };
                format!(
                    "FROM python:3.12-slim\n\
                     WORKDIR /app\n\
                     COPY requirements.txt ./\n\
                     RUN pip install --no-cache-dir -r requirements.txt\n\
                     COPY . .\n\
                     EXPOSE {port}\n\
                     CMD {command}\n",
                    port = self.port(),
                )
            }
        }
    }
}

fn pick_entry(candidates: &[&str], files: &[String], extension: &str, default: &str) -> String {
    candidates
        .iter()
        .find(|candidate| files.iter().any(|f| f == *candidate))
        .map(|candidate| (*candidate).to_string())
        .or_else(|| files.iter().find(|f| f.ends_with(extension)).cloned())
        .unwrap_or_else(|| default.to_string())
}

/// A database container for the compose file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DatabaseService {
    image: &'static str,
    environment: &'static [(&'static str, &'static str)],
    data_dir: &'static str,
    url: &'static str,
}

fn database_service(database: &str) -> Option<DatabaseService> {
    let database = database.to_ascii_lowercase();
    if database.contains("postgres") {
        Some(DatabaseService {
            image: "postgres:16-alpine",
            environment: &[
                ("POSTGRES_USER", "app"),
                ("POSTGRES_PASSWORD", "app"),
                ("POSTGRES_DB", "app"),
            ],
            data_dir: "/var/lib/postgresql/data",
            url: "postgres://app:app@db:5432/app",
        })
    } else if database.contains("mysql") || database.contains("mariadb") {
        Some(DatabaseService {
            image: "mysql:8",
            environment: &[
                ("MYSQL_DATABASE", "app"),
                ("MYSQL_USER", "app"),
                ("MYSQL_PASSWORD", "app"),
                ("MYSQL_ROOT_PASSWORD", "root"),
            ],
            data_dir: "/var/lib/mysql",
            url: "mysql://app:app@db:3306/app",
        })
    } else if database.contains("mongo") {
        Some(DatabaseService {
            image: "mongo:7",
            environment: &[],
            data_dir: "/data/db",
            url: "mongodb://db:27017/app",
        })
    } else if database.contains("redis") {
        Some(DatabaseService {
            image: "redis:7-alpine",
            environment: &[],
            data_dir: "/data",
            url: "redis://db:6379",
        })
    } else {
        None
    }
}

/// Packages the project for containers and asks for a deployment guide.
#[derive(Debug, Clone)]
pub struct DeploymentStage {
    backend: Arc<dyn GenerationBackend>,
}

impl DeploymentStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for DeploymentStage {
    fn name(&self) -> &str {
        DEPLOYMENT_STAGE
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let requirements = ctx.inputs().requirements()?;
        let backend = ctx.inputs().backend()?;
        let validation = ctx.inputs().validation()?;
        let config = ctx.config();

        ctx.log(LogLevel::Info, "Packaging deployment files").await;
        ctx.progress(10);

        let runtime = match backend {
            BackendOutput::Generated { framework, files, .. } => Some(Runtime::detect(framework, files)),
            BackendOutput::Skipped { .. } => None,
        };
        let database = requirements
            .tech_stack
            .database
            .as_deref()
            .or(config.database.as_deref())
            .filter(|_| runtime.is_some());
        let db_service = database.and_then(database_service);

        let stage = ctx.stage();
        let mut artifacts = vec![GeneratedArtifact::new(stage, FRONTEND_DOCKERFILE, frontend_dockerfile())];
        if let Some(runtime) = &runtime {
            artifacts.push(GeneratedArtifact::new(stage, BACKEND_DOCKERFILE, runtime.dockerfile()));
        }

        let mut services = vec!["frontend".to_string()];
        if runtime.is_some() {
            services.push("backend".to_string());
        }
        if db_service.is_some() {
            services.push("db".to_string());
        }

        artifacts.push(GeneratedArtifact::new(
            stage,
            COMPOSE_FILE,
            compose_file(runtime.as_ref(), db_service.as_ref()),
        ));
        artifacts.push(GeneratedArtifact::new(
            stage,
            ENV_TEMPLATE,
            env_template(
                runtime.as_ref(),
                database,
                db_service.as_ref(),
                requirements.needs_auth,
            ),
        ));
        ctx.progress(50);

        let mut files: Vec<String> = artifacts.iter().map(|a| a.path.clone()).collect();
        files.push(DEPLOYMENT_GUIDE.to_string());

        let request = GenerationRequest::new(deployment_prompt(config, &services, &files))
            .with_system_instruction(DEPLOYMENT_SYSTEM);
        let guide = self
            .backend
            .generate(request)
            .await
            .map_err(|e| StageFailure::backend("deployment guide generation", &e))?;
        let mut guide = guide.content.trim().to_string();
        guide.push('\n');
        artifacts.push(GeneratedArtifact::new(stage, DEPLOYMENT_GUIDE, guide));
        ctx.progress(90);

        if !validation.is_production_ready {
            ctx.log(
                LogLevel::Warn,
                "Packaging a build that validation did not mark production-ready",
            )
            .await;
        }
        ctx.log(
            LogLevel::Success,
            format!("Deployment ready with services: {}", services.join(", ")),
        )
        .await;

        Ok(StageSuccess::new(StageOutput::Deployment(DeploymentOutput {
            files,
            services,
            production_ready: validation.is_production_ready,
        }))
        .with_artifacts(artifacts))
    }
}

fn frontend_dockerfile() -> String {
    "FROM node:20-alpine AS build\n\
     WORKDIR /app\n\
     COPY package*.json ./\n\
     RUN npm ci\n\
     COPY . .\n\
     RUN npm run build\n\
     \n\
     FROM nginx:1.27-alpine\n\
     COPY --from=build /app/dist /usr/share/nginx/html\n\
     EXPOSE 80\n\
     CMD [\"nginx\", \"-g\", \"daemon off;\"]\n"
        .to_string()
}

fn compose_file(runtime: Option<&Runtime>, db: Option<&DatabaseService>) -> String {
    let mut yaml = String::from("services:\n");
    yaml.push_str(
        "  frontend:\n    build:\n      context: .\n      dockerfile: Dockerfile\n    ports:\n      - \"8080:80\"\n",
    );
    if runtime.is_some() {
        yaml.push_str("    depends_on:\n      - backend\n");
    }

    if let Some(runtime) = runtime {
        let port = runtime.port();
        let _ = write!(
            yaml,
            "  backend:\n    build:\n      context: .\n      dockerfile: {BACKEND_DOCKERFILE}\n    env_file: .env\n    ports:\n      - \"{port}:{port}\"\n"
        );
        if db.is_some() {
            yaml.push_str("    depends_on:\n      - db\n");
        }
    }

    if let Some(db) = db {
        let _ = writeln!(yaml, "  db:\n    image: {}", db.image);
        if !db.environment.is_empty() {
            yaml.push_str("    environment:\n");
            for (key, value) in db.environment {
                let _ = writeln!(yaml, "      {key}: {value}");
            }
        }
        let _ = writeln!(yaml, "    volumes:\n      - db-data:{}", db.data_dir);
        yaml.push_str("volumes:\n  db-data:\n");
    }
    yaml
}

fn env_template(
    runtime: Option<&Runtime>,
    database: Option<&str>,
    db: Option<&DatabaseService>,
    needs_auth: bool,
) -> String {
    let mut env = String::from("NODE_ENV=production\n");
    let _ = writeln!(env, "PORT={}", runtime.map_or(8080, Runtime::port));
    match (db, database) {
        (Some(db), _) => {
            let _ = writeln!(env, "DATABASE_URL={}", db.url);
        }
        (None, Some(database)) if database.to_ascii_lowercase().contains("sqlite") => {
            env.push_str("DATABASE_URL=file:./data.db\n");
        }
        (None, Some(_)) => env.push_str("DATABASE_URL=\n"),
        (None, None) => {}
    }
    if needs_auth {
        env.push_str("JWT_SECRET=change-me\n");
    }
    if runtime.is_some() {
        env.push_str("VITE_API_URL=/api\n");
    }
    env
}
