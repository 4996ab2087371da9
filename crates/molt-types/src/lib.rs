//! # molt-types
//!
//! Shared domain types used across the Molt workspace: agents, mint
//! records, the social feed, content identifiers, networks and time.

pub mod agent;
pub mod content;
pub mod network;
pub mod nft;
pub mod social;
pub mod time;

pub use agent::Agent;
pub use content::ContentId;
pub use network::Network;
pub use nft::NftRecord;
pub use social::{Comment, Post, Submint, UpvoteAction, UpvoteTarget};
pub use time::{Clock, ManualClock, SystemClock};

/// Identifier aliases. All ids are UUID v4 strings.
pub type AgentId = String;
pub type NftId = String;
pub type PostId = String;
pub type CommentId = String;
pub type AttemptId = String;

/// Transaction hash as a 0x-prefixed hex string.
pub type TxHash = String;

/// Minimum interval between two mints of the same agent (24 hours).
pub const COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Seconds per hour, used for `hours_remaining` reporting.
pub const SECS_PER_HOUR: u64 = 60 * 60;

/// Maximum accepted length of a mood description.
pub const MAX_MOOD_LEN: usize = 500;

/// Maximum accepted length of post/comment bodies.
pub const MAX_BODY_LEN: usize = 10_000;

/// Error raised when a string does not parse into a domain type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown network: {0}")]
    Network(String),

    #[error("invalid submint: {0}")]
    Submint(String),

    #[error("invalid content uri: {0}")]
    ContentUri(String),
}
