//! Account addresses and transaction hashes.
//!
//! Addresses are `0x` + 40 hex chars. Mixed case is accepted without
//! checksum verification; the canonical form is lowercase.

use crate::error::{WalletError, WalletResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ADDRESS_BYTES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(value: &str) -> WalletResult<Self> {
        let trimmed = value.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| WalletError::InvalidRecipient(value.to_string()))?;
        let bytes = hex::decode(body).map_err(|_| WalletError::InvalidRecipient(value.to_string()))?;
        if bytes.len() != ADDRESS_BYTES {
            return Err(WalletError::InvalidRecipient(value.to_string()));
        }
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    pub fn is_valid(value: &str) -> bool { Self::parse(value).is_ok() }

    pub fn as_str(&self) -> &str { &self.0 }

    /// `0x12345678...9abcdef0` form used in history listings.
    pub fn short(&self) -> String { shorten(&self.0) }
}

impl FromStr for Address {
    type Err = WalletError;
    fn from_str(s: &str) -> WalletResult<Self> { Self::parse(s) }
}

impl TryFrom<String> for Address {
    type Error = WalletError;
    fn try_from(value: String) -> WalletResult<Self> { Self::parse(&value) }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self { addr.0 }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Opaque transaction identifier assigned by the provider at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self { Self(hash.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn short(&self) -> String { shorten(&self.0) }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for TxHash {
    fn from(value: &str) -> Self { Self(value.to_string()) }
}

fn shorten(value: &str) -> String {
    if value.len() <= 18 || !value.is_ascii() {
        return value.to_string();
    }
    format!("{}...{}", &value[..10], &value[value.len() - 8..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

    #[test]
    fn parses_and_lowercases() {
        let addr = Address::parse(ADDR).unwrap();
        assert_eq!(addr.as_str(), "0x742d35cc6634c0532925a3b844bc454e4438f44e");
        assert_eq!(addr, Address::parse(&ADDR.to_lowercase()).unwrap());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["not-an-address", "0x", "0xBBB", "742d35cc6634c0532925a3b844bc454e4438f44e", "0xzz2d35cc6634c0532925a3b844bc454e4438f44e", "0x742d35cc6634c0532925a3b844bc454e4438f44e00"] {
            assert!(matches!(Address::parse(bad), Err(WalletError::InvalidRecipient(_))), "{bad}");
        }
    }

    #[test]
    fn short_forms() {
        let addr = Address::parse(ADDR).unwrap();
        assert_eq!(addr.short(), "0x742d35cc...4438f44e");
        assert_eq!(TxHash::from("0xabc").short(), "0xabc");
    }

    #[test]
    fn serde_validates() {
        let ok: Address = serde_json::from_str(&format!("\"{ADDR}\"")).unwrap();
        assert_eq!(ok.as_str(), ADDR.to_lowercase());
        assert!(serde_json::from_str::<Address>("\"0x1\"").is_err());
    }
}
