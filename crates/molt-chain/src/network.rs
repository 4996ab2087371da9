//! Per-network chain settings and public links.

use molt_types::Network;

/// RPC endpoint, contract and link bases for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub network: Network,
    pub rpc_url: String,
    pub chain_id: u64,
    /// `None` until the contract is deployed on this network.
    pub contract_address: Option<String>,
    /// Prefix for transaction links, ending in `/tx/`.
    pub explorer_base: String,
    /// Prefix for token links; contract and token id are appended.
    pub marketplace_base: String,
}

impl NetworkProfile {
    /// Base Sepolia / Base mainnet defaults without a contract address.
    pub fn defaults(network: Network) -> Self {
        match network {
            Network::Testnet => Self {
                network,
                rpc_url: "https://sepolia.base.org".into(),
                chain_id: 84532,
                contract_address: None,
                explorer_base: "https://sepolia.basescan.org/tx/".into(),
                marketplace_base: "https://testnets.opensea.io/assets/base-sepolia/".into(),
            },
            Network::Mainnet => Self {
                network,
                rpc_url: "https://mainnet.base.org".into(),
                chain_id: 8453,
                contract_address: None,
                explorer_base: "https://basescan.org/tx/".into(),
                marketplace_base: "https://opensea.io/assets/base/".into(),
            },
        }
    }

    pub fn with_contract(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    /// Block explorer link for a transaction.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/{tx_hash}", self.explorer_base.trim_end_matches('/'))
    }

    /// Marketplace link for a token; needs both contract and token id.
    pub fn marketplace_url(&self, token_id: Option<u64>) -> Option<String> {
        let contract = self.contract_address.as_deref()?;
        let token_id = token_id?;
        Some(format!(
            "{}/{contract}/{token_id}",
            self.marketplace_base.trim_end_matches('/')
        ))
    }
}
