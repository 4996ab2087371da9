//! Database query functions organized by domain.

pub mod agents;
pub mod nfts;
pub mod posts;
