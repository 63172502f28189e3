//! Session Configuration - passed from higher layers

use crate::core::Address;
use std::time::Duration;

/// Contract the demo mint targets unless configured otherwise.
pub const DEFAULT_NFT_CONTRACT: &str = "0x1234567890123456789012345678901234567890";

/// Session configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Blocks to wait for before a transaction counts as confirmed
    pub confirmations: u64,
    /// Budget for a single `awaitConfirmation`
    pub confirmation_timeout: Duration,
    /// Extra gas on top of the wallet's estimate, in percent
    pub gas_buffer_percent: u64,
    /// Fractional digits shown for balances
    pub balance_precision: u32,
    pub nft_contract: Address,
    /// Fixed gas limit for mints instead of a buffered estimate
    pub mint_gas_limit: u64,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(120),
            gas_buffer_percent: 20,
            balance_precision: 4,
            nft_contract: Address::parse(DEFAULT_NFT_CONTRACT).expect("DEFAULT_NFT_CONTRACT is well-formed"),
            mint_gas_limit: 150_000,
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self { Self::default() }
    pub fn with_confirmations(mut self, n: u64) -> Self { self.confirmations = n.max(1); self }
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self { self.confirmation_timeout = timeout; self }
    pub fn with_gas_buffer_percent(mut self, percent: u64) -> Self { self.gas_buffer_percent = percent; self }
    pub fn with_balance_precision(mut self, digits: u32) -> Self { self.balance_precision = digits.min(18); self }
    pub fn with_nft_contract(mut self, contract: Address) -> Self { self.nft_contract = contract; self }
    pub fn with_mint_gas_limit(mut self, gas: u64) -> Self { self.mint_gas_limit = gas; self }
    pub fn with_event_buffer(mut self, capacity: usize) -> Self { self.event_buffer = capacity.max(1); self }

    /// Fast settings for tests and demos.
    pub fn fast_test() -> Self {
        Self { confirmation_timeout: Duration::from_secs(2), ..Self::default() }
    }
}
