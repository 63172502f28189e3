//! Connection state as the UI sees it

use crate::core::{Address, Network, Wei};
use crate::provider::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Singleton session record. `account`, `network` and `balance` are set
/// together and only while `Connected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub status: ConnectionStatus,
    pub account: Option<Address>,
    pub network: Option<Network>,
    /// Ether, rounded for display.
    pub balance: Option<String>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn disconnected() -> Self { Self::default() }

    pub fn connecting() -> Self { Self { status: ConnectionStatus::Connecting, ..Self::default() } }

    pub fn connected(connection: &Connection, precision: u32) -> Self {
        Self {
            status: ConnectionStatus::Connected,
            account: Some(connection.account.clone()),
            network: Some(connection.network.clone()),
            balance: Some(connection.balance.to_ether_fixed(precision)),
            last_error: None,
        }
    }

    pub fn errored(message: impl Into<String>) -> Self {
        Self { status: ConnectionStatus::Error, last_error: Some(message.into()), ..Self::default() }
    }

    pub fn is_connected(&self) -> bool { self.status == ConnectionStatus::Connected }

    pub fn set_balance(&mut self, balance: Wei, precision: u32) -> bool {
        let display = Some(balance.to_ether_fixed(precision));
        if self.balance == display {
            return false;
        }
        self.balance = display;
        true
    }

    /// Connection fields are all-or-nothing with `Connected`.
    pub fn is_consistent(&self) -> bool {
        let populated = [self.account.is_some(), self.network.is_some(), self.balance.is_some()];
        if self.is_connected() {
            populated.iter().all(|p| *p)
        } else {
            populated.iter().all(|p| !*p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection {
            account: Address::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            network: Network::from_chain_id(1),
            balance: Wei::parse_ether("1.23456").unwrap(),
        }
    }

    #[test]
    fn every_constructor_is_consistent() {
        for session in [
            Session::disconnected(),
            Session::connecting(),
            Session::connected(&connection(), 4),
            Session::errored("User rejected"),
        ] {
            assert!(session.is_consistent(), "{session:?}");
        }
    }

    #[test]
    fn connected_formats_balance() {
        let session = Session::connected(&connection(), 4);
        assert_eq!(session.balance.as_deref(), Some("1.2346"));
        assert_eq!(session.network.as_ref().map(|n| n.name.as_str()), Some("Ethereum Mainnet"));
        assert!(session.last_error.is_none());
    }

    #[test]
    fn partial_fields_are_inconsistent() {
        let mut session = Session::connected(&connection(), 4);
        session.network = None;
        assert!(!session.is_consistent());

        let mut session = Session::disconnected();
        session.balance = Some("0.0000".into());
        assert!(!session.is_consistent());
    }

    #[test]
    fn set_balance_reports_changes_only() {
        let mut session = Session::connected(&connection(), 4);
        assert!(!session.set_balance(Wei::parse_ether("1.23456").unwrap(), 4));
        assert!(session.set_balance(Wei::parse_ether("2").unwrap(), 4));
        assert_eq!(session.balance.as_deref(), Some("2.0000"));
    }
}
