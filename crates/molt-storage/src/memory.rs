//! In-process content store.
//!
//! Computes real CIDv1 identifiers (sha2-256) so records look like the ones
//! a pinning service returns. Used by tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use cid::Cid;
use molt_types::ContentId;
use multihash_codetable::{Code, MultihashDigest};

use crate::metadata::MetadataDocument;
use crate::{ContentStore, Result, StoreError};

/// Multicodec for raw bytes.
const RAW_CODEC: u64 = 0x55;
/// Multicodec for JSON.
const JSON_CODEC: u64 = 0x0200;

/// CIDv1 of `data` under the given codec.
pub fn compute_cid(codec: u64, data: &[u8]) -> ContentId {
    let hash = Code::Sha2_256.digest(data);
    ContentId::new(Cid::new_v1(codec, hash).to_string())
}

/// Content store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
    publish_count: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored bytes for a content id.
    pub fn get(&self, cid: &ContentId) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(cid.as_str()).cloned())
    }

    /// Number of successful publishes.
    pub fn publish_count(&self) -> u32 {
        self.publish_count.load(Ordering::SeqCst)
    }

    fn put(&self, codec: u64, data: Vec<u8>) -> Result<ContentId> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let cid = compute_cid(codec, &data);
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))?;
        objects.insert(cid.as_str().to_string(), data);
        self.publish_count.fetch_add(1, Ordering::SeqCst);
        Ok(cid)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn id(&self) -> &str {
        "memory"
    }

    async fn publish_image(&self, bytes: &[u8], file_name: &str) -> Result<ContentId> {
        let cid = self.put(RAW_CODEC, bytes.to_vec())?;
        tracing::debug!(%cid, file_name, "image stored in memory");
        Ok(cid)
    }

    async fn publish_metadata(&self, document: &MetadataDocument) -> Result<ContentId> {
        let json = serde_json::to_vec(document)?;
        self.put(JSON_CODEC, json)
    }
}
