//! Core trait for image generation providers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use crate::prompt::ImagePrompt;

/// Error types for generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Provider could not be reached or answered with a server error.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider refused the prompt or reported a failed prediction.
    #[error("provider rejected request: {0}")]
    ProviderRejected(String),

    /// The asynchronous job did not finish in time.
    #[error("generation timed out after {waited:?}")]
    Timeout { waited: Duration },

    /// No provider or credentials configured.
    #[error("generation not configured: {0}")]
    NotConfigured(String),
}

impl GenerationError {
    /// Map a non-success HTTP status to an error.
    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = format!("{status}: {}", truncate(body, 200));
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            GenerationError::ProviderUnavailable(detail)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            GenerationError::NotConfigured(detail)
        } else {
            GenerationError::ProviderRejected(detail)
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GenerationError::ProviderRejected(format!("malformed response: {e}"))
        } else {
            GenerationError::ProviderUnavailable(e.to_string())
        }
    }
}

/// Raw image returned by a provider.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Provider identifier, e.g. `openai:dall-e-3`.
    pub provider: String,
    /// Full prompt text sent to the provider.
    pub prompt: String,
}

/// Image generation provider.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Provider identifier (e.g. `openai:dall-e-3`).
    fn id(&self) -> &str;

    /// Generate one square image for the prompt.
    async fn generate(&self, prompt: &ImagePrompt) -> Result<GeneratedImage, GenerationError>;
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
