//! Core value types shared by the provider and session layers.

pub mod address;
pub mod networks;
pub mod units;

pub use address::{Address, TxHash};
pub use networks::{known_networks, network_name, parse_chain_id, Network};
pub use units::Wei;
