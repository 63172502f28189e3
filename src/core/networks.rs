//! Chain id → human-readable network name.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

static KNOWN_NETWORKS: Lazy<BTreeMap<u64, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        (1, "Ethereum Mainnet"),
        (3, "Ropsten Testnet"),
        (4, "Rinkeby Testnet"),
        (5, "Goerli Testnet"),
        (42, "Kovan Testnet"),
        (56, "Binance Smart Chain"),
        (97, "Binance Smart Chain Testnet"),
        (137, "Polygon Mainnet"),
        (80001, "Polygon Mumbai Testnet"),
        (43114, "Avalanche C-Chain"),
        (43113, "Avalanche Fuji Testnet"),
    ])
});

/// Active network as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
}

impl Network {
    pub fn from_chain_id(chain_id: u64) -> Self {
        Self { name: network_name(chain_id), chain_id }
    }

    pub fn is_known(&self) -> bool { KNOWN_NETWORKS.contains_key(&self.chain_id) }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} ({})", self.name, self.chain_id) }
}

pub fn network_name(chain_id: u64) -> String {
    KNOWN_NETWORKS
        .get(&chain_id)
        .map(|name| (*name).to_string())
        .unwrap_or_else(|| format!("Chain ID {}", chain_id))
}

/// All known networks, ordered by chain id.
pub fn known_networks() -> Vec<Network> {
    KNOWN_NETWORKS.iter().map(|(id, name)| Network { name: (*name).to_string(), chain_id: *id }).collect()
}

/// Parse a chain id as wallets report it: `"0x89"`, `"137"` or a JSON number.
pub fn parse_chain_id(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
