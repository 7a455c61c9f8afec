//! OpenAI-compatible chat-completion backend.

use super::{BackendError, GenerationBackend, GenerationRequest, GenerationResponse, HttpBackendConfig};
use crate::utils::elapsed_ms;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error};

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// A [`GenerationBackend`] posting to `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct HttpGenerationBackend {
    config: HttpBackendConfig,
    client: Client,
}

impl HttpGenerationBackend {
    /// Creates a backend; the HTTP client carries the configured timeout.
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Creates a backend from `PROJECTFLOW_LLM_*` environment variables.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::new(HttpBackendConfig::from_env()?)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn map_send_error(&self, err: &reqwest::Error) -> BackendError {
        if err.is_timeout() {
            error!(timeout_seconds = self.config.timeout_seconds, "Generation request timed out");
            BackendError::Timeout {
                seconds: self.config.timeout_seconds,
            }
        } else if err.is_connect() {
            error!(base_url = %self.config.base_url, "Cannot connect to generation service");
            BackendError::Network(format!("connection failed: {err}"))
        } else {
            error!(error = %err, "Generation request failed");
            BackendError::Network(format!("request failed: {err}"))
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, BackendError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_instruction.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        debug!(
            model = %self.config.model,
            prompt_len = request.prompt.len(),
            "Sending generation request"
        );

        let start = Instant::now();
        let mut builder = self.client.post(self.config.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            error!(status = status.as_u16(), body = %text, "Generation service returned an error");
            return Err(BackendError::Api {
                message: format!("HTTP {status}: {text}"),
                status_code: Some(status.as_u16()),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("JSON parse error: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("no content in completion".to_string()))?;

        let latency_ms = elapsed_ms(start);
        debug!(latency_ms, content_len = content.len(), "Generation completed");

        Ok(GenerationResponse::new(
            content,
            parsed.model.unwrap_or_else(|| self.config.model.clone()),
            latency_ms,
        ))
    }
}
