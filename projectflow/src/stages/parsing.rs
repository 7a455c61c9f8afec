//! Pure helpers that turn generated text into structured data.
//!
//! Nothing here performs I/O; every function is deterministic in its input.

use crate::core::{GeneratedArtifact, IssueSeverity, ValidationIssue};
use crate::store::upsert_by_path;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(`{3,})\s*(.*?)\s*$").expect("fence regex is valid"));

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:#{1,6}\s+)?(?:[-*]\s+)?(?:\d+[.)]\s+)?(?:\*\*)?\s*(?:(?i:file(?:name)?|path)\s*:\s*)?(?:\*\*)?\s*`?(?P<path>[^\s`*]+?)`?\s*(?:\*\*)?\s*:?\s*(?:\*\*)?\s*$",
    )
    .expect("header regex is valid")
});

static ISSUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:[-*]\s+|\d+[.)]\s+)?(?:\*\*|\[)?\s*(?P<tag>(?i:critical|warning|info))\b\s*(?:(?:\*\*|\])\s*[:\-]?|[:\-])\s*(?:\*\*)?\s*(?P<msg>.*\S)\s*$",
    )
    .expect("issue regex is valid")
});

static ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:\b(?:app|router|server)\.|@(?:app|router)\.)(?P<method>get|post|put|patch|delete)\(\s*['"`](?P<path>/[^'"`]*)['"`]"#,
    )
    .expect("route regex is valid")
});

const KNOWN_FILE_NAMES: [&str; 4] = ["Dockerfile", "Makefile", "Procfile", "Gemfile"];

/// Extracts file artifacts from a generated response.
///
/// A fenced block becomes an artifact when its info string carries a path
/// (```` ```tsx src/App.tsx ````, `tsx:src/App.tsx`, `title="src/App.tsx"`)
/// or when the nearest non-blank line above it names one (`File: path`,
/// `### path`, `**path**`, `` `path` ``). Blocks without a path and
/// unterminated blocks are ignored. A later block for the same path replaces
/// the earlier one in place.
#[must_use]
pub fn extract_artifacts(stage: &str, raw: &str) -> Vec<GeneratedArtifact> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut artifacts = Vec::new();
    let mut search_floor = 0;
    let mut i = 0;

    while i < lines.len() {
        let Some(open) = FENCE.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let ticks = open[1].len();
        let info = open.get(2).map_or("", |m| m.as_str());

        let Some(close) = (i + 1..lines.len()).find(|&j| is_fence_close(lines[j], ticks)) else {
            break;
        };

        let (language, info_path) = parse_info(info);
        let path = info_path.or_else(|| {
            lines[search_floor..i]
                .iter()
                .rev()
                .find(|line| !line.trim().is_empty())
                .and_then(|line| header_path(line))
        });

        if let Some(path) = path {
            let mut content = lines[i + 1..close].join("\n");
            if !content.is_empty() {
                content.push('\n');
            }
            let mut artifact = GeneratedArtifact::new(stage, path, content);
            if let Some(language) = language {
                artifact = artifact.with_language(language);
            }
            upsert_by_path(&mut artifacts, &artifact);
        }

        search_floor = close + 1;
        i = close + 1;
    }

    artifacts
}

fn is_fence_close(line: &str, ticks: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= ticks && trimmed.chars().all(|c| c == '`')
}

/// Splits a fence info string into an optional language and optional path.
fn parse_info(info: &str) -> (Option<String>, Option<String>) {
    let mut language = None;
    let mut path = None;

    for token in info.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            let is_path_key = matches!(
                key.to_ascii_lowercase().as_str(),
                "title" | "file" | "filename" | "path"
            );
            if is_path_key && looks_like_path(value) {
                path.get_or_insert_with(|| value.to_string());
            }
        } else if let Some((lang, candidate)) = token.split_once(':') {
            if looks_like_path(candidate) {
                path.get_or_insert_with(|| candidate.to_string());
                if !lang.is_empty() {
                    language.get_or_insert_with(|| lang.to_ascii_lowercase());
                }
            }
        } else if looks_like_path(token) {
            path.get_or_insert_with(|| token.to_string());
        } else if language.is_none() && is_language_tag(token) {
            language = Some(token.to_ascii_lowercase());
        }
    }

    (language, path)
}

fn is_language_tag(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '#' | '_'))
}

fn header_path(line: &str) -> Option<String> {
    let captures = HEADER.captures(line)?;
    let candidate = captures.name("path")?.as_str();
    looks_like_path(candidate).then(|| candidate.to_string())
}

/// Returns true if `s` is plausibly a relative file path.
#[must_use]
pub fn looks_like_path(s: &str) -> bool {
    if s.is_empty() || s.contains("://") || s.ends_with('/') {
        return false;
    }
    let allowed = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '\\' | '@' | '[' | ']' | '+'));
    if !allowed {
        return false;
    }

    let name = s.rsplit(['/', '\\']).next().unwrap_or(s);
    if KNOWN_FILE_NAMES.contains(&name) {
        return true;
    }
    if let Some(rest) = name.strip_prefix('.') {
        // Dotfiles such as .env.example or .gitignore.
        return rest.len() > 1 && rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=10).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Returns the outermost JSON object embedded in `text`, ignoring braces
/// inside string literals.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses review findings from lines tagged `CRITICAL`, `WARNING` or `INFO`.
///
/// Tags are case-insensitive and may be bulleted, bold or bracketed
/// (`- **CRITICAL**: ...`, `[WARNING] ...`). Untagged lines are ignored.
#[must_use]
pub fn parse_issues(report: &str) -> Vec<ValidationIssue> {
    report
        .lines()
        .filter_map(|line| {
            let captures = ISSUE.captures(line)?;
            let severity = match captures["tag"].to_ascii_lowercase().as_str() {
                "critical" => IssueSeverity::Critical,
                "warning" => IssueSeverity::Warning,
                _ => IssueSeverity::Info,
            };
            let message = captures["msg"].trim_end_matches("**").trim().to_string();
            (!message.is_empty()).then_some(ValidationIssue { severity, message })
        })
        .collect()
}

/// Finds HTTP routes declared in Express- or FastAPI-style code.
///
/// Returns `METHOD /path` strings, deduplicated in first-seen order.
#[must_use]
pub fn extract_endpoints<'a>(sources: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();

    for source in sources {
        for captures in ROUTE.captures_iter(source) {
            let endpoint = format!(
                "{} {}",
                captures["method"].to_ascii_uppercase(),
                &captures["path"]
            );
            if seen.insert(endpoint.clone()) {
                endpoints.push(endpoint);
            }
        }
    }

    endpoints
}
