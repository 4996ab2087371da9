//! Replicate predictions backend.
//!
//! Asynchronous: create a prediction, poll its status URL under a
//! [`PollPolicy`], then download the first output URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::poll::PollPolicy;
use crate::prompt::{ImagePrompt, DEFAULT_STYLE};
use crate::traits::{GeneratedImage, GenerationError, ImageGenerator};

/// Default API base.
pub const REPLICATE_BASE_URL: &str = "https://api.replicate.com/v1";

/// SDXL model version.
pub const DEFAULT_SDXL_VERSION: &str =
    "ac732df83cea7fff18b8472768c88ad041fa750ff7682a21affe81863cbe77e4";

/// Replicate backend.
pub struct ReplicateProvider {
    client: Client,
    base_url: String,
    api_token: String,
    version: String,
    id: String,
    policy: PollPolicy,
    default_style: String,
}

impl ReplicateProvider {
    pub fn new(
        base_url: impl Into<String>,
        version: impl Into<String>,
        api_token: impl Into<String>,
        policy: PollPolicy,
    ) -> Result<Self, GenerationError> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(GenerationError::NotConfigured("Replicate API token is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GenerationError::NotConfigured(format!("HTTP client: {e}")))?;
        let version = version.into();
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
            id: format!("replicate:{}", version.chars().take(12).collect::<String>()),
            version,
            policy,
            default_style: DEFAULT_STYLE.to_string(),
        })
    }

    /// Backend for the public Replicate API running SDXL.
    pub fn sdxl(api_token: impl Into<String>, policy: PollPolicy) -> Result<Self, GenerationError> {
        Self::new(REPLICATE_BASE_URL, DEFAULT_SDXL_VERSION, api_token, policy)
    }

    /// Style used when the prompt carries none.
    pub fn with_default_style(mut self, style: impl Into<String>) -> Self {
        self.default_style = style.into();
        self
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.api_token)
    }

    async fn create_prediction(&self, prompt: &str) -> Result<Prediction, GenerationError> {
        let body = PredictionRequest {
            version: &self.version,
            input: PredictionInput {
                prompt,
                width: 1024,
                height: 1024,
                num_outputs: 1,
            },
        };
        let response = self
            .client
            .post(format!("{}/predictions", self.base_url))
            .header(header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        read_prediction(response).await
    }

    async fn fetch_prediction(&self, url: &str) -> Result<Prediction, GenerationError> {
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;
        read_prediction(response).await
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String), GenerationError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::from_status(status, ""));
        }
        let mime_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(GenerationError::ProviderRejected("empty image".into()));
        }
        Ok((bytes, mime_type))
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    num_outputs: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    urls: PredictionUrls,
}

#[derive(Debug, Clone, Deserialize)]
struct PredictionUrls {
    get: String,
}

/// Where a prediction stands.
#[derive(Debug, PartialEq, Eq)]
enum PredictionState {
    Running,
    Succeeded(String),
}

impl Prediction {
    fn state(&self) -> Result<PredictionState, GenerationError> {
        match self.status.as_str() {
            "starting" | "processing" => Ok(PredictionState::Running),
            "succeeded" => first_output_url(self.output.as_ref())
                .map(PredictionState::Succeeded)
                .ok_or_else(|| {
                    GenerationError::ProviderRejected(format!(
                        "prediction {} succeeded without output",
                        self.id
                    ))
                }),
            "failed" | "canceled" => Err(GenerationError::ProviderRejected(format!(
                "prediction {} {}: {}",
                self.id,
                self.status,
                self.error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "no detail".into())
            ))),
            other => Err(GenerationError::ProviderRejected(format!(
                "prediction {} in unknown state {other}",
                self.id
            ))),
        }
    }
}

/// Output is either a URL string or a list of URL strings.
fn first_output_url(output: Option<&serde_json::Value>) -> Option<String> {
    match output? {
        serde_json::Value::String(url) => Some(url.clone()),
        serde_json::Value::Array(items) => items.first()?.as_str().map(str::to_string),
        _ => None,
    }
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::from_status(status, &body));
    }
    Ok(response.json().await?)
}

#[async_trait]
impl ImageGenerator for ReplicateProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &ImagePrompt) -> Result<GeneratedImage, GenerationError> {
        let text = prompt.render_with_default(&self.default_style);
        let created = self.create_prediction(&text).await?;
        tracing::debug!(provider = %self.id, prediction = %created.id, "prediction created");

        let status_url = created.urls.get.clone();
        let mut latest = Some(created);
        let output_url = self
            .policy
            .run(|| {
                let seen = latest.take();
                let status_url = status_url.clone();
                async move {
                    let prediction = match seen {
                        Some(prediction) => prediction,
                        None => self.fetch_prediction(&status_url).await?,
                    };
                    match prediction.state()? {
                        PredictionState::Running => Ok(None),
                        PredictionState::Succeeded(url) => Ok(Some(url)),
                    }
                }
            })
            .await?;

        let (bytes, mime_type) = self.download(&output_url).await?;
        Ok(GeneratedImage {
            bytes,
            mime_type,
            provider: self.id.clone(),
            prompt: text,
        })
    }
}
