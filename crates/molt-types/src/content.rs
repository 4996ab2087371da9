//! Content identifiers and their URI form.
//!
//! Stored references always use the `ipfs://<cid>` scheme. Resolution to a
//! fetchable URL goes through a gateway prefix chosen by the reader, never
//! at storage time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// URI scheme for content-addressed references.
pub const IPFS_SCHEME: &str = "ipfs://";

/// A content identifier as returned by the content store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ipfs://<cid>`
    pub fn uri(&self) -> String {
        format!("{IPFS_SCHEME}{}", self.0)
    }

    /// Parse an `ipfs://` URI (or a bare identifier) into a content id.
    pub fn from_uri(uri: &str) -> Result<Self, ParseError> {
        let cid = uri.strip_prefix(IPFS_SCHEME).unwrap_or(uri).trim();
        if cid.is_empty() || cid.contains(char::is_whitespace) || cid.contains("://") {
            return Err(ParseError::ContentUri(uri.to_string()));
        }
        Ok(Self(cid.to_string()))
    }

    /// Resolve against a gateway prefix such as `https://gateway.pinata.cloud/ipfs/`.
    pub fn gateway_url(&self, gateway: &str) -> String {
        format!("{}/{}", gateway.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
