//! Custodial agent wallets.
//!
//! Each agent gets a fresh secp256k1 keypair at registration. Only the
//! address is stored; the private key is handed to the agent once.

use alloy::signers::local::PrivateKeySigner;
use zeroize::Zeroizing;

use crate::evm::parse_address;
use crate::Result;

/// Freshly generated wallet.
pub struct AgentWallet {
    /// Checksummed `0x` address.
    pub address: String,
    /// `0x`-prefixed hex private key. Wiped on drop.
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for AgentWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentWallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl AgentWallet {
    pub fn generate() -> Self {
        let signer = PrivateKeySigner::random();
        Self {
            address: signer.address().to_checksum(None),
            private_key: Zeroizing::new(format!("0x{}", hex::encode(signer.to_bytes()))),
        }
    }
}

/// Normalize an address to checksummed form.
pub fn checksum_address(address: &str) -> Result<String> {
    Ok(parse_address(address)?.to_checksum(None))
}
