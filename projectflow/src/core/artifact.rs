//! Generated artifact type for files produced by stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// A file-like output produced by a stage.
///
/// Artifacts are persisted independently of the execution state and are
/// unique per `(run, path)`: writing the same path again replaces the
/// content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Relative path of the file inside the generated project.
    pub path: String,

    /// File content.
    pub content: String,

    /// Size of `content` in bytes.
    pub size: usize,

    /// Source language, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Name of the stage that produced the artifact.
    pub stage: String,

    /// Hex-encoded SHA-256 of `content`.
    pub checksum: String,

    /// When the artifact was produced.
    pub created_at: DateTime<Utc>,
}

impl GeneratedArtifact {
    /// Creates a new artifact; size and checksum are derived from `content`.
    #[must_use]
    pub fn new(stage: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = normalize_path(&path.into());
        let content = content.into();
        let language = language_for_path(&path).map(str::to_string);

        Self {
            size: content.len(),
            checksum: checksum(&content),
            path,
            content,
            language,
            stage: stage.into(),
            created_at: Utc::now(),
        }
    }

    /// Overrides the detected language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Returns true if both artifacts carry the same bytes.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.checksum == other.checksum
    }
}

fn checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Strips leading `./` and `/` and converts backslashes so paths compare equal.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut trimmed = unified.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

/// Maps a file extension (or well-known file name) to a language tag.
#[must_use]
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let file = Path::new(path);
    if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
        match name {
            "Dockerfile" => return Some("dockerfile"),
            "Makefile" => return Some("makefile"),
            _ => {}
        }
    }

    let ext = file.extension()?.to_str()?.to_ascii_lowercase();
    let language = match ext.as_str() {
        "ts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "sql" => "sql",
        "sh" => "bash",
        "vue" => "vue",
        "svelte" => "svelte",
        "prisma" => "prisma",
        _ => return None,
    };
    Some(language)
}
