//! # molt-storage
//!
//! Content-addressed storage for mint artifacts.
//!
//! A [`ContentStore`] publishes raw image bytes and the JSON metadata
//! document, returning content identifiers that are recorded verbatim.
//! Every publish is a fresh side effect; nothing is cached here.

pub mod memory;
pub mod metadata;
pub mod pinata;

use async_trait::async_trait;
use molt_types::ContentId;

pub use memory::MemoryStore;
pub use metadata::{Attribute, MetadataDocument, MetadataProperties};
pub use pinata::{PinataConfig, PinataStore};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Service unreachable or answered with a server error.
    #[error("content store unavailable: {0}")]
    Unavailable(String),

    /// Service refused the upload.
    #[error("content store rejected upload: {0}")]
    Rejected(String),

    /// Missing credentials.
    #[error("content store not configured: {0}")]
    NotConfigured(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A content-addressed store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store identifier for logs.
    fn id(&self) -> &str;

    /// Publish raw image bytes.
    async fn publish_image(&self, bytes: &[u8], file_name: &str) -> Result<ContentId>;

    /// Publish a metadata document.
    async fn publish_metadata(&self, document: &MetadataDocument) -> Result<ContentId>;
}
