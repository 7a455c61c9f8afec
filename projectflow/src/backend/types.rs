//! Request and response types for generation backends.

use serde::{Deserialize, Serialize};

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// User prompt.
    pub prompt: String,
    /// Optional system instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl GenerationRequest {
    /// Creates a request with only a prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
        }
    }

    /// Sets the system instruction.
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// A successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text.
    pub content: String,
    /// Model that answered.
    pub model: String,
    /// Round-trip latency.
    pub latency_ms: u64,
}

impl GenerationResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(content: impl Into<String>, model: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            latency_ms,
        }
    }
}
