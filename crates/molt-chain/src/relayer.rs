//! Relayer abstraction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use molt_types::Network;
use serde::Serialize;

use crate::network::NetworkProfile;
use crate::{ChainError, Result};

/// A confirmed mint transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintConfirmation {
    pub tx_hash: String,
    /// From the `DailyMint` event; `None` when the event was not found.
    pub token_id: Option<u64>,
    pub block_number: Option<u64>,
    /// Chain time of the mint (event timestamp, else block time).
    pub minted_at: Option<u64>,
}

/// Receipt lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Known to the node but not mined yet.
    Pending,
    /// Neither mined nor in the node's pool.
    Unknown,
    Confirmed(MintConfirmation),
    Reverted,
}

/// A locally signed `mintDaily` transaction.
///
/// The hash is final before anything leaves the process, so it can be
/// journaled ahead of the broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMint {
    pub tx_hash: String,
    pub raw: Vec<u8>,
}

/// Signs and submits mints with the relayer wallet of one network.
#[async_trait]
pub trait Relayer: Send + Sync {
    /// Network and link settings this relayer mints on.
    fn profile(&self) -> &NetworkProfile;

    /// Build and sign `mintDaily(recipient, metadata_uri)` without sending it.
    ///
    /// Fails with [`ChainError::TransactionReverted`] when gas estimation
    /// shows the call would revert.
    async fn sign(&self, recipient: &str, metadata_uri: &str) -> Result<SignedMint>;

    /// Send a signed transaction.
    ///
    /// Only errors for which [`ChainError::is_definite_rejection`] holds mean
    /// the node refused it; any other error leaves the outcome unknown.
    async fn broadcast(&self, signed: &SignedMint) -> Result<()>;

    /// Wait until the transaction is mined or `timeout` elapses.
    async fn await_confirmation(&self, tx_hash: &str, timeout: Duration) -> Result<MintConfirmation>;

    /// One-shot receipt lookup, used by reconciliation.
    async fn receipt(&self, tx_hash: &str) -> Result<ReceiptStatus>;

    /// Token ids minted to `recipient`, in mint order.
    async fn timeline(&self, recipient: &str) -> Result<Vec<u64>>;

    /// Metadata URI stored for `token_id`.
    async fn token_uri(&self, token_id: u64) -> Result<String>;

    /// Sign and broadcast, returning the tx hash.
    async fn submit(&self, recipient: &str, metadata_uri: &str) -> Result<String> {
        let signed = self.sign(recipient, metadata_uri).await?;
        self.broadcast(&signed).await?;
        Ok(signed.tx_hash)
    }

    /// Submit and wait for confirmation in one call.
    async fn mint(
        &self,
        recipient: &str,
        metadata_uri: &str,
        timeout: Duration,
    ) -> Result<MintConfirmation> {
        let tx_hash = self.submit(recipient, metadata_uri).await?;
        self.await_confirmation(&tx_hash, timeout).await
    }
}

/// Relayers keyed by network.
#[derive(Clone, Default)]
pub struct RelayerSet {
    relayers: HashMap<Network, Arc<dyn Relayer>>,
    default_network: Network,
}

impl RelayerSet {
    pub fn new(default_network: Network) -> Self {
        Self {
            relayers: HashMap::new(),
            default_network,
        }
    }

    pub fn with(mut self, relayer: Arc<dyn Relayer>) -> Self {
        self.insert(relayer);
        self
    }

    pub fn insert(&mut self, relayer: Arc<dyn Relayer>) {
        self.relayers.insert(relayer.profile().network, relayer);
    }

    pub fn default_network(&self) -> Network {
        self.default_network
    }

    /// Relayer for `network`, or the default network when `None`.
    pub fn get(&self, network: Option<Network>) -> Result<Arc<dyn Relayer>> {
        let network = network.unwrap_or(self.default_network);
        self.relayers.get(&network).cloned().ok_or_else(|| {
            ChainError::NotConfigured(format!("no relayer configured for {network}"))
        })
    }

    /// Configured networks.
    pub fn networks(&self) -> Vec<Network> {
        let mut networks: Vec<Network> = self.relayers.keys().copied().collect();
        networks.sort_by_key(|n| n.as_str());
        networks
    }
}

impl std::fmt::Debug for RelayerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerSet")
            .field("networks", &self.networks())
            .field("default_network", &self.default_network)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRelayer;

    #[test]
    fn test_lookup_by_network() {
        let set = RelayerSet::new(Network::Testnet).with(Arc::new(MockRelayer::new(Network::Testnet)));
        assert!(set.get(None).is_ok());
        assert!(set.get(Some(Network::Testnet)).is_ok());
        assert!(matches!(
            set.get(Some(Network::Mainnet)),
            Err(ChainError::NotConfigured(_))
        ));
        assert_eq!(set.networks(), vec![Network::Testnet]);
    }

    #[tokio::test]
    async fn test_default_mint_combines_steps() {
        let relayer = MockRelayer::new(Network::Testnet);
        let confirmation = relayer
            .mint(
                "0x0000000000000000000000000000000000000001",
                "ipfs://QmMeta",
                Duration::from_secs(5),
            )
            .await
            .expect("mint");
        assert_eq!(confirmation.token_id, Some(1));
        assert_eq!(relayer.submit_count(), 1);
    }
}
