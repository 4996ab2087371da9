//! Pinata pinning service client.

use std::time::Duration;

use async_trait::async_trait;
use molt_types::ContentId;
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metadata::MetadataDocument;
use crate::{ContentStore, Result, StoreError};

/// Default API base.
pub const PINATA_API_URL: &str = "https://api.pinata.cloud";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct PinataConfig {
    pub api_url: String,
    pub api_key: String,
    pub secret_key: String,
    /// Attempts per publish on transport errors and 5xx answers.
    pub max_attempts: u32,
    /// First retry delay; doubles on each further retry.
    pub retry_base: Duration,
    pub request_timeout: Duration,
}

impl PinataConfig {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_url: PINATA_API_URL.to_string(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            max_attempts: 3,
            retry_base: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Pinata-backed [`ContentStore`].
pub struct PinataStore {
    config: PinataConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PinJsonRequest<'a> {
    pinata_content: &'a MetadataDocument,
    pinata_metadata: PinMetadata,
}

#[derive(Debug, Serialize)]
struct PinMetadata {
    name: String,
}

impl PinataStore {
    pub fn new(config: PinataConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() || config.secret_key.trim().is_empty() {
            return Err(StoreError::NotConfigured("Pinata API keys are empty".into()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/pinning/{path}", self.config.api_url.trim_end_matches('/'))
    }

    /// Send one request built by `build`, retrying transient failures with
    /// exponential backoff.
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<ContentId>
    where
        F: Fn() -> Result<reqwest::RequestBuilder>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let request = build()?
                .header("pinata_api_key", &self.config.api_key)
                .header("pinata_secret_api_key", &self.config.secret_key);

            let error = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let pinned: PinResponse = response
                            .json()
                            .await
                            .map_err(|e| StoreError::Rejected(format!("malformed response: {e}")))?;
                        debug!(what, cid = %pinned.ipfs_hash, "pinned");
                        return ContentId::from_uri(&pinned.ipfs_hash)
                            .map_err(|e| StoreError::Rejected(e.to_string()));
                    }
                    let body = response.text().await.unwrap_or_default();
                    classify(status, &body)
                }
                Err(e) => StoreError::Unavailable(e.to_string()),
            };

            let retryable = matches!(error, StoreError::Unavailable(_));
            if !retryable || attempt >= max_attempts {
                return Err(error);
            }
            let delay = self.config.retry_base * 2_u32.pow(attempt - 1);
            warn!(what, attempt, max_attempts, ?delay, %error, "pin failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn classify(status: StatusCode, body: &str) -> StoreError {
    let detail = format!("{status}: {}", body.chars().take(200).collect::<String>());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(detail)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        StoreError::NotConfigured(detail)
    } else {
        StoreError::Rejected(detail)
    }
}

#[async_trait]
impl ContentStore for PinataStore {
    fn id(&self) -> &str {
        "pinata"
    }

    async fn publish_image(&self, bytes: &[u8], file_name: &str) -> Result<ContentId> {
        let url = self.url("pinFileToIPFS");
        self.send_with_retry("image", || {
            let part = multipart::Part::bytes(bytes.to_vec())
                .file_name(file_name.to_string())
                .mime_str("image/png")
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
            let form = multipart::Form::new().part("file", part);
            Ok(self.client.post(&url).multipart(form))
        })
        .await
    }

    async fn publish_metadata(&self, document: &MetadataDocument) -> Result<ContentId> {
        let url = self.url("pinJSONToIPFS");
        let name = document.pin_name();
        self.send_with_retry("metadata", || {
            let body = PinJsonRequest {
                pinata_content: document,
                pinata_metadata: PinMetadata { name: name.clone() },
            };
            Ok(self.client.post(&url).json(&body))
        })
        .await
    }
}
