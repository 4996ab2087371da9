//! Alloy-backed relayer.
//!
//! Mints are signed locally so the tx hash is known before broadcast.
//! Providers are not cached: one is built per call from the RPC URL.

use std::str::FromStr;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use alloy::transports::TransportError;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::abi::MoodMint;
use crate::network::NetworkProfile;
use crate::relayer::{MintConfirmation, ReceiptStatus, Relayer, SignedMint};
use crate::{ChainError, Result};

/// Default receipt polling interval.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Relayer that signs with a local private key.
pub struct AlloyRelayer {
    profile: NetworkProfile,
    contract_address: Address,
    signer: PrivateKeySigner,
    poll_interval: Duration,
}

impl AlloyRelayer {
    /// Validate the profile and relayer key.
    pub fn new(profile: NetworkProfile, relayer_key: &str) -> Result<Self> {
        let contract = profile.contract_address.as_deref().ok_or_else(|| {
            ChainError::NotConfigured(format!("no contract address for {}", profile.network))
        })?;
        let contract_address = Address::from_str(contract).map_err(|e| {
            ChainError::Configuration(format!("Invalid contract address '{contract}': {e}"))
        })?;
        if relayer_key.trim().is_empty() {
            return Err(ChainError::NotConfigured(format!(
                "no relayer key for {}",
                profile.network
            )));
        }
        let signer = relayer_key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| ChainError::Configuration(format!("Invalid relayer key: {e}")))?;

        info!(
            network = %profile.network,
            contract = %contract_address,
            relayer = %signer.address(),
            "relayer ready"
        );

        Ok(Self {
            profile,
            contract_address,
            signer,
            poll_interval: RECEIPT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Address of the relayer wallet (pays gas).
    pub fn relayer_address(&self) -> Address {
        self.signer.address()
    }

    fn read_provider(&self) -> Result<impl Provider> {
        let rpc_url = self
            .profile
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Configuration(format!("Invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new().connect_http(rpc_url))
    }

    async fn fetch_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>> {
        let provider = self.read_provider()?;
        provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    fn confirmation_from(&self, receipt: &TransactionReceipt) -> Result<MintConfirmation> {
        let tx_hash = format_tx_hash(receipt.transaction_hash);
        if !receipt.status() {
            return Err(ChainError::TransactionReverted(tx_hash));
        }
        let token_id = daily_mint_token_id(receipt);
        if token_id.is_none() {
            warn!(%tx_hash, "DailyMint event not found in receipt");
        }
        Ok(MintConfirmation {
            tx_hash,
            token_id,
            block_number: receipt.block_number,
            minted_at: daily_mint_timestamp(receipt),
        })
    }
}

#[async_trait]
impl Relayer for AlloyRelayer {
    fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    async fn sign(&self, recipient: &str, metadata_uri: &str) -> Result<SignedMint> {
        let to = parse_address(recipient)?;
        let from = self.signer.address();
        let provider = self.read_provider()?;

        let input = MoodMint::mintDailyCall {
            to,
            metadataUri: metadata_uri.to_string(),
        }
        .abi_encode();
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(self.contract_address)
            .with_input(input)
            .with_chain_id(self.profile.chain_id);

        let gas = provider
            .estimate_gas(request.clone())
            .await
            .map_err(|e| classify_send_error(&e.to_string()))?;
        let fees = provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| ChainError::ContractUnavailable(e.to_string()))?;
        let nonce = provider
            .get_transaction_count(from)
            .pending()
            .await
            .map_err(|e| ChainError::ContractUnavailable(e.to_string()))?;

        let envelope = request
            .with_nonce(nonce)
            .with_gas_limit(gas)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .build(&EthereumWallet::from(self.signer.clone()))
            .await
            .map_err(|e| ChainError::Configuration(format!("Failed to sign mint: {e}")))?;

        let tx_hash = format_tx_hash(*envelope.tx_hash());
        debug!(%tx_hash, recipient, nonce, network = %self.profile.network, "mint signed");
        Ok(SignedMint {
            tx_hash,
            raw: envelope.encoded_2718(),
        })
    }

    async fn broadcast(&self, signed: &SignedMint) -> Result<()> {
        let provider = self.read_provider()?;
        match provider.send_raw_transaction(&signed.raw).await {
            Ok(_) => {
                debug!(tx_hash = %signed.tx_hash, network = %self.profile.network, "mint broadcast");
                Ok(())
            }
            Err(e) => classify_broadcast_error(&e),
        }
    }

    async fn await_confirmation(&self, tx_hash: &str, timeout: Duration) -> Result<MintConfirmation> {
        let hash = parse_tx_hash(tx_hash)?;
        let started = Instant::now();
        loop {
            if let Some(receipt) = self.fetch_receipt(hash).await? {
                return self.confirmation_from(&receipt);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ChainError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.poll_interval.min(timeout - waited)).await;
        }
    }

    async fn receipt(&self, tx_hash: &str) -> Result<ReceiptStatus> {
        let hash = parse_tx_hash(tx_hash)?;
        match self.fetch_receipt(hash).await? {
            None => {
                let provider = self.read_provider()?;
                let known = provider
                    .get_transaction_by_hash(hash)
                    .await
                    .map_err(|e| ChainError::Rpc(e.to_string()))?;
                Ok(if known.is_some() {
                    ReceiptStatus::Pending
                } else {
                    ReceiptStatus::Unknown
                })
            }
            Some(receipt) => match self.confirmation_from(&receipt) {
                Ok(confirmation) => Ok(ReceiptStatus::Confirmed(confirmation)),
                Err(ChainError::TransactionReverted(_)) => Ok(ReceiptStatus::Reverted),
                Err(e) => Err(e),
            },
        }
    }

    async fn timeline(&self, recipient: &str) -> Result<Vec<u64>> {
        let agent = parse_address(recipient)?;
        let provider = self.read_provider()?;
        let contract = MoodMint::new(self.contract_address, &provider);
        let ids = contract
            .getAgentTimeline(agent)
            .call()
            .await
            .map_err(|e| ChainError::ContractUnavailable(e.to_string()))?;
        ids.into_iter().map(u256_to_u64).collect()
    }

    async fn token_uri(&self, token_id: u64) -> Result<String> {
        let provider = self.read_provider()?;
        let contract = MoodMint::new(self.contract_address, &provider);
        contract
            .tokenURI(U256::from(token_id))
            .call()
            .await
            .map_err(|e| ChainError::ContractUnavailable(e.to_string()))
    }
}

/// Token id of the first `DailyMint` event in the receipt.
fn daily_mint_token_id(receipt: &TransactionReceipt) -> Option<u64> {
    receipt.inner.logs().iter().find_map(|log| {
        log.log_decode::<MoodMint::DailyMint>()
            .ok()
            .and_then(|decoded| u64::try_from(decoded.data().tokenId).ok())
    })
}

/// Chain time of the first `DailyMint` event, falling back to the log's
/// block timestamp.
fn daily_mint_timestamp(receipt: &TransactionReceipt) -> Option<u64> {
    receipt.inner.logs().iter().find_map(|log| {
        log.log_decode::<MoodMint::DailyMint>()
            .ok()
            .and_then(|decoded| u64::try_from(decoded.data().timestamp).ok())
            .or(log.block_timestamp)
    })
}

/// A JSON-RPC error response means the node looked at the transaction and
/// refused it, unless it says it already has it. Transport failures leave
/// the outcome unknown.
fn classify_broadcast_error(error: &TransportError) -> Result<()> {
    match error.as_error_resp() {
        Some(payload) => classify_node_response(&payload.message),
        None => Err(ChainError::Rpc(error.to_string())),
    }
}

fn classify_node_response(message: &str) -> Result<()> {
    let lower = message.to_ascii_lowercase();
    if lower.contains("already known") || lower.contains("known transaction") {
        return Ok(());
    }
    Err(ChainError::ContractUnavailable(message.to_string()))
}

/// Reverts surfaced during gas estimation count as reverts; everything
/// else means the node could not take the transaction.
fn classify_send_error(message: &str) -> ChainError {
    if message.to_ascii_lowercase().contains("revert") {
        ChainError::TransactionReverted(format!("rejected before broadcast: {message}"))
    } else {
        ChainError::ContractUnavailable(message.to_string())
    }
}

fn format_tx_hash(hash: TxHash) -> String {
    format!("0x{hash:x}")
}

fn parse_tx_hash(tx_hash: &str) -> Result<TxHash> {
    TxHash::from_str(tx_hash)
        .map_err(|e| ChainError::Configuration(format!("Invalid tx hash '{tx_hash}': {e}")))
}

pub(crate) fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address)
        .map_err(|e| ChainError::Configuration(format!("Invalid address '{address}': {e}")))
}

fn u256_to_u64(value: U256) -> Result<u64> {
    u64::try_from(value).map_err(|_| ChainError::Rpc(format!("value {value} exceeds u64")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use molt_types::Network;

    const CONTRACT: &str = "0x1111111111111111111111111111111111111111";
    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_requires_contract() {
        let profile = NetworkProfile::defaults(Network::Testnet);
        assert!(matches!(
            AlloyRelayer::new(profile, KEY),
            Err(ChainError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_requires_key() {
        let profile = NetworkProfile::defaults(Network::Testnet).with_contract(CONTRACT);
        assert!(matches!(
            AlloyRelayer::new(profile.clone(), ""),
            Err(ChainError::NotConfigured(_))
        ));
        assert!(matches!(
            AlloyRelayer::new(profile, "not-a-key"),
            Err(ChainError::Configuration(_))
        ));
    }

    #[test]
    fn test_valid_configuration() {
        let profile = NetworkProfile::defaults(Network::Testnet).with_contract(CONTRACT);
        let relayer = AlloyRelayer::new(profile, KEY).expect("relayer");
        assert_eq!(relayer.profile().chain_id, 84532);
        assert_ne!(relayer.relayer_address(), Address::ZERO);
    }

    #[test]
    fn test_classify_send_error() {
        assert!(matches!(
            classify_send_error("execution reverted: cooldown"),
            ChainError::TransactionReverted(_)
        ));
        assert!(matches!(
            classify_send_error("connection refused"),
            ChainError::ContractUnavailable(_)
        ));
    }

    #[test]
    fn test_node_responses() {
        assert!(classify_node_response("already known").is_ok());
        assert!(classify_node_response("Known transaction: 0xab").is_ok());
        assert!(matches!(
            classify_node_response("nonce too low"),
            Err(ChainError::ContractUnavailable(_))
        ));
        assert!(matches!(
            classify_node_response("insufficient funds for gas * price + value"),
            Err(ChainError::ContractUnavailable(_))
        ));
    }

    #[test]
    fn test_tx_hash_round_trip() {
        let text = format!("0x{}", "ab".repeat(32));
        let hash = parse_tx_hash(&text).expect("parse");
        assert_eq!(format_tx_hash(hash), text);
        assert!(parse_tx_hash("0x12").is_err());
    }

    #[test]
    fn test_u256_conversion() {
        assert_eq!(u256_to_u64(U256::from(7u64)).expect("fits"), 7);
        assert!(u256_to_u64(U256::MAX).is_err());
    }
}
