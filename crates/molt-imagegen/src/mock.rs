//! Mock generator for tests and dry runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::prompt::ImagePrompt;
use crate::traits::{GeneratedImage, GenerationError, ImageGenerator};

/// PNG file signature; mock images start with it.
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Failure the mock should produce on the next calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    Rejected,
    Timeout,
}

/// Deterministic generator: the same prompt always yields the same bytes.
pub struct MockGenerator {
    id: String,
    failure: Mutex<Option<MockFailure>>,
    call_count: AtomicU32,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            id: "mock".to_string(),
            failure: Mutex::new(None),
            call_count: AtomicU32::new(0),
        }
    }

    /// Fail every call with the given error.
    pub fn with_failure(self, failure: MockFailure) -> Self {
        self.set_failure(Some(failure));
        self
    }

    /// Change the failure mode at runtime.
    pub fn set_failure(&self, failure: Option<MockFailure>) {
        if let Ok(mut guard) = self.failure.lock() {
            *guard = failure;
        }
    }

    /// Number of times generate was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenerator for MockGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &ImagePrompt) -> Result<GeneratedImage, GenerationError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let failure = self.failure.lock().ok().and_then(|guard| *guard);
        match failure {
            Some(MockFailure::Unavailable) => {
                return Err(GenerationError::ProviderUnavailable("mock unavailable".into()))
            }
            Some(MockFailure::Rejected) => {
                return Err(GenerationError::ProviderRejected("mock rejected prompt".into()))
            }
            Some(MockFailure::Timeout) => {
                return Err(GenerationError::Timeout {
                    waited: Duration::from_secs(120),
                })
            }
            None => {}
        }

        let text = prompt.render();
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(text.as_bytes());

        Ok(GeneratedImage {
            bytes,
            mime_type: "image/png".to_string(),
            provider: self.id.clone(),
            prompt: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_output() {
        let generator = MockGenerator::new();
        let prompt = ImagePrompt::new("happy");
        let first = generator.generate(&prompt).await.expect("generate");
        let second = generator.generate(&prompt).await.expect("generate");
        assert_eq!(first.bytes, second.bytes);
        assert!(first.bytes.starts_with(&PNG_SIGNATURE));
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let generator = MockGenerator::new().with_failure(MockFailure::Rejected);
        let prompt = ImagePrompt::new("angry");
        assert!(matches!(
            generator.generate(&prompt).await,
            Err(GenerationError::ProviderRejected(_))
        ));

        generator.set_failure(Some(MockFailure::Timeout));
        assert!(matches!(
            generator.generate(&prompt).await,
            Err(GenerationError::Timeout { .. })
        ));

        generator.set_failure(None);
        assert!(generator.generate(&prompt).await.is_ok());
        assert_eq!(generator.call_count(), 3);
    }
}
