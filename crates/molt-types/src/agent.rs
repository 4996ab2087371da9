//! Agent identity and mint statistics.

use serde::{Deserialize, Serialize};

/// A registered agent.
///
/// The custodial wallet's private key is never part of this struct: it is
/// handed out once at registration and not persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    /// Unique external handle, chosen at registration.
    pub handle: String,
    pub display_name: String,
    pub bio: Option<String>,
    /// Checksummed 0x address of the custodial wallet. Mint recipient only.
    pub wallet_address: String,
    pub created_at: u64,
    /// Cooldown marker. `None` until the first recorded mint.
    pub last_mint_at: Option<u64>,
    /// Equals the number of NFT records owned by this agent.
    pub total_mints: u64,
}

impl Agent {
    /// Sequential day number the next mint will carry.
    pub fn next_day_number(&self) -> u64 {
        self.total_mints + 1
    }
}
