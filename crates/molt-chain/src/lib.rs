//! # molt-chain
//!
//! On-chain side of the daily mint.
//!
//! A custodial relayer wallet signs `mintDaily(recipient, metadataUri)` on
//! the MoodMint contract; agent wallets only ever receive tokens. Signing
//! capability is injected per network through a [`RelayerSet`].
//!
//! ## Modules
//!
//! - [`abi`]: contract bindings
//! - [`network`]: per-network RPC/contract settings and explorer links
//! - [`relayer`]: the [`Relayer`] trait and [`RelayerSet`]
//! - [`evm`]: alloy-backed relayer
//! - [`mock`]: in-memory chain for tests
//! - [`wallet`]: custodial agent wallet generation

pub mod abi;
pub mod evm;
pub mod mock;
pub mod network;
pub mod relayer;
pub mod wallet;

use std::time::Duration;

pub use evm::AlloyRelayer;
pub use mock::{MockMode, MockRelayer};
pub use network::NetworkProfile;
pub use relayer::{MintConfirmation, ReceiptStatus, Relayer, RelayerSet, SignedMint};
pub use wallet::AgentWallet;

/// Errors from the relayer and contract calls.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Contract or node refused the transaction; nothing was broadcast.
    #[error("contract unavailable: {0}")]
    ContractUnavailable(String),

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    TransactionReverted(String),

    /// The transaction was broadcast but not confirmed in time.
    #[error("transaction {tx_hash} not confirmed after {waited:?}")]
    ConfirmationTimeout { tx_hash: String, waited: Duration },

    /// No relayer configured for the requested network.
    #[error("chain not configured: {0}")]
    NotConfigured(String),

    /// RPC transport error; the node may or may not have the transaction.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Invalid address, key or URL.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ChainError {
    /// Whether the error proves the transaction never reached a node.
    ///
    /// Anything else after a broadcast attempt leaves the mint in doubt.
    pub fn is_definite_rejection(&self) -> bool {
        matches!(
            self,
            ChainError::ContractUnavailable(_)
                | ChainError::TransactionReverted(_)
                | ChainError::NotConfigured(_)
                | ChainError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definite_rejections() {
        assert!(ChainError::ContractUnavailable("nonce too low".into()).is_definite_rejection());
        assert!(ChainError::TransactionReverted("0x1".into()).is_definite_rejection());
        assert!(!ChainError::Rpc("request timed out".into()).is_definite_rejection());
        assert!(!ChainError::ConfirmationTimeout {
            tx_hash: "0x1".into(),
            waited: Duration::from_secs(1),
        }
        .is_definite_rejection());
    }
}
