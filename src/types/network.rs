//! Network identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cluster a payment settles on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Network {
    #[default]
    #[serde(rename = "mainnet-beta")]
    MainnetBeta,
    #[serde(rename = "devnet")]
    Devnet,
    #[serde(rename = "testnet")]
    Testnet,
}

impl Network {
    /// Get the network identifier string
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::MainnetBeta => "mainnet-beta",
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
        }
    }

    /// Whether payments on this network carry no real value
    pub fn is_test_network(&self) -> bool {
        !matches!(self, Network::MainnetBeta)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = crate::X402Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "mainnet-beta" | "mainnet" => Ok(Network::MainnetBeta),
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(crate::X402Error::config(
                "network",
                format!("unknown network '{}'", other),
            )),
        }
    }
}
