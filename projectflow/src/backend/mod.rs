//! Generation backend seam.
//!
//! Stages talk to the text-completion service only through
//! [`GenerationBackend`]. One call is one atomic request/response; the
//! orchestrator never retries.

mod config;
#[cfg(feature = "http")]
mod http;
mod types;

pub use config::HttpBackendConfig;
#[cfg(feature = "http")]
pub use http::HttpGenerationBackend;
pub use types::{GenerationRequest, GenerationResponse};

pub use crate::errors::BackendError;

use async_trait::async_trait;
use std::fmt::Debug;

/// An opaque text-completion service.
#[async_trait]
pub trait GenerationBackend: Send + Sync + Debug {
    /// Returns the backend name for logs.
    fn name(&self) -> &str;

    /// Submits one prompt and returns the generated text.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, BackendError> {
            Ok(GenerationResponse::new(request.prompt, "echo-1", 0))
        }
    }

    #[tokio::test]
    async fn test_backend_trait_object() {
        let backend: std::sync::Arc<dyn GenerationBackend> = std::sync::Arc::new(EchoBackend);
        let response = backend
            .generate(GenerationRequest::new("hello").with_system_instruction("be brief"))
            .await
            .unwrap();

        assert_eq!(backend.name(), "echo");
        assert_eq!(response.content, "hello");
        assert_eq!(response.model, "echo-1");
    }
}
