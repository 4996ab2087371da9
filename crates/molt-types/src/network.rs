//! Target chain networks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// The chain network a mint is submitted to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Maps the legacy `useMainnet` flag.
    pub fn from_mainnet_flag(use_mainnet: bool) -> Self {
        if use_mainnet {
            Network::Mainnet
        } else {
            Network::Testnet
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" | "test" | "base-sepolia" => Ok(Network::Testnet),
            "mainnet" | "main" | "base" => Ok(Network::Mainnet),
            other => Err(ParseError::Network(other.to_string())),
        }
    }
}
