//! OpenAI images backend.
//!
//! Synchronous request/response: one POST returns the image as base64.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::prompt::{ImagePrompt, DEFAULT_STYLE};
use crate::traits::{GeneratedImage, GenerationError, ImageGenerator};

/// Default API base.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default image model.
pub const DEFAULT_MODEL: &str = "dall-e-3";

/// OpenAI-compatible image generation backend.
pub struct OpenAiImages {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    id: String,
    default_style: String,
}

impl OpenAiImages {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured("OpenAI API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GenerationError::NotConfigured(format!("HTTP client: {e}")))?;
        let model = model.into();
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            id: format!("openai:{model}"),
            model,
            default_style: DEFAULT_STYLE.to_string(),
        })
    }

    /// Backend for the public OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Result<Self, GenerationError> {
        Self::new(OPENAI_BASE_URL, DEFAULT_MODEL, api_key, Duration::from_secs(120))
    }

    /// Style used when the prompt carries none.
    pub fn with_default_style(mut self, style: impl Into<String>) -> Self {
        self.default_style = style.into();
        self
    }

    fn generations_url(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &ImagePrompt) -> Result<GeneratedImage, GenerationError> {
        let text = prompt.render_with_default(&self.default_style);
        let body = ImagesRequest {
            model: &self.model,
            prompt: &text,
            n: 1,
            size: "1024x1024",
            response_format: "b64_json",
        };

        tracing::debug!(provider = %self.id, "requesting image");
        let response = self
            .client
            .post(self.generations_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status, &body));
        }

        let parsed: ImagesResponse = response.json().await?;
        let encoded = parsed
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| GenerationError::ProviderRejected("response carried no image".into()))?;
        let bytes = decode_image(&encoded)?;

        Ok(GeneratedImage {
            bytes,
            mime_type: "image/png".to_string(),
            provider: self.id.clone(),
            prompt: text,
        })
    }
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, GenerationError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| GenerationError::ProviderRejected(format!("invalid base64 image: {e}")))?;
    if bytes.is_empty() {
        return Err(GenerationError::ProviderRejected("empty image".into()));
    }
    Ok(bytes)
}
