//! Configuration for the HTTP generation backend.

use super::BackendError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix read by [`HttpBackendConfig::from_env`].
pub const ENV_PREFIX: &str = "PROJECTFLOW_LLM_";

/// Settings for an OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token, if the endpoint needs one.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    8192
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl HttpBackendConfig {
    /// Creates a configuration for `base_url` and `model`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Chat-completion endpoint URL.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Reads `PROJECTFLOW_LLM_{BASE_URL,MODEL,API_KEY,TIMEOUT_SECONDS,TEMPERATURE,MAX_TOKENS}`
    /// on top of the defaults.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::default().with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Applies overrides read through `lookup`, keyed without the prefix.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, BackendError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = lookup("MODEL") {
            self.model = model;
        }
        if let Some(key) = lookup("API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(raw) = lookup("TIMEOUT_SECONDS") {
            self.timeout_seconds = parse_setting("TIMEOUT_SECONDS", &raw)?;
        }
        if let Some(raw) = lookup("TEMPERATURE") {
            self.temperature = parse_setting("TEMPERATURE", &raw)?;
        }
        if let Some(raw) = lookup("MAX_TOKENS") {
            self.max_tokens = parse_setting("MAX_TOKENS", &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks the URL scheme and numeric ranges.
    pub fn validate(&self) -> Result<(), BackendError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(BackendError::Configuration(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(BackendError::Configuration("model must not be empty".to_string()));
        }
        if self.timeout_seconds == 0 {
            return Err(BackendError::Configuration(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(BackendError::Configuration(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, BackendError> {
    raw.trim().parse().map_err(|_| {
        BackendError::Configuration(format!("{ENV_PREFIX}{key} has an invalid value: '{raw}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HttpBackendConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let config = HttpBackendConfig::new("https://api.example.com/v1/", "gpt");
        assert_eq!(config.completions_url(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_overrides() {
        let config = HttpBackendConfig::default()
            .with_overrides(lookup(&[
                ("BASE_URL", "https://llm.internal/v1"),
                ("MODEL", "coder"),
                ("API_KEY", "sk-test"),
                ("TIMEOUT_SECONDS", "30"),
                ("TEMPERATURE", "0.7"),
                ("MAX_TOKENS", "1024"),
            ]))
            .unwrap();

        assert_eq!(config.model, "coder");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.timeout_seconds, 30);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_tokens, 1024);
    }

    #[test]
    fn test_invalid_values() {
        for pairs in [
            [("TIMEOUT_SECONDS", "soon")],
            [("TIMEOUT_SECONDS", "0")],
            [("TEMPERATURE", "9")],
            [("BASE_URL", "ftp://x")],
        ] {
            let err = HttpBackendConfig::default()
                .with_overrides(lookup(&pairs))
                .unwrap_err();
            assert!(matches!(err, BackendError::Configuration(_)), "{pairs:?}");
        }
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = HttpBackendConfig::default().with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
