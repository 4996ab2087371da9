//! Committed mint records.

use serde::{Deserialize, Serialize};

use crate::{ContentId, Network};

/// Durable record of one confirmed on-chain mint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftRecord {
    pub id: String,
    pub agent_id: String,
    pub network: Network,
    /// `None` when the mint event could not be read; backfilled by reconciliation.
    pub token_id: Option<u64>,
    pub image_cid: Option<ContentId>,
    pub metadata_cid: ContentId,
    pub tx_hash: String,
    pub mood: Option<String>,
    pub minted_at: u64,
}

impl NftRecord {
    pub fn metadata_uri(&self) -> String {
        self.metadata_cid.uri()
    }

    pub fn image_uri(&self) -> Option<String> {
        self.image_cid.as_ref().map(ContentId::uri)
    }
}
