//! Native-unit amounts: wei in, ether/gwei decimal strings out.

use crate::error::{WalletError, WalletResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ETHER_DECIMALS: u32 = 18;
pub const GWEI_DECIMALS: u32 = 9;

/// Amount in wei (10^-18 of the native unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Parse a decimal ether string ("1", "0.25", ".5"). Rejects signs,
    /// exponents and more than 18 fractional digits.
    pub fn parse_ether(value: &str) -> WalletResult<Self> {
        parse_units(value, ETHER_DECIMALS).map(Wei)
    }

    pub fn from_gwei(gwei: u64) -> Self { Wei(gwei as u128 * 10u128.pow(GWEI_DECIMALS)) }

    /// Full-precision ether string with trailing zeros trimmed.
    pub fn to_ether_string(&self) -> String { format_exact(self.0, ETHER_DECIMALS) }

    /// Ether rounded half-up to `precision` fractional digits, zero padded.
    pub fn to_ether_fixed(&self, precision: u32) -> String { format_fixed(self.0, ETHER_DECIMALS, precision) }

    pub fn to_gwei_string(&self) -> String { format_exact(self.0, GWEI_DECIMALS) }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_ether_string()) }
}

fn parse_units(value: &str, decimals: u32) -> WalletResult<u128> {
    let invalid = || WalletError::InvalidAmount(value.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() { return Err(invalid()); }
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() { return Err(invalid()); }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > decimals as usize { return Err(invalid()); }

    let scale = 10u128.pow(decimals);
    let whole_units: u128 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse().map_err(|_| invalid())?
    };
    whole_units
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)
}

fn format_exact(amount: u128, decimals: u32) -> String {
    let scale = 10u128.pow(decimals);
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

fn format_fixed(amount: u128, decimals: u32, precision: u32) -> String {
    let precision = precision.min(decimals);
    let drop = 10u128.pow(decimals - precision);
    // half-up, same as Number.toFixed for the values wallets report
    let rounded = amount / drop + u128::from(amount % drop >= drop / 2 && drop > 1);
    let keep = 10u128.pow(precision);
    let whole = rounded / keep;
    if precision == 0 {
        return whole.to_string();
    }
    format!("{}.{:0>width$}", whole, rounded % keep, width = precision as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_ether() {
        assert_eq!(Wei::parse_ether("1").unwrap(), Wei(1_000_000_000_000_000_000));
        assert_eq!(Wei::parse_ether("0.25").unwrap(), Wei(250_000_000_000_000_000));
        assert_eq!(Wei::parse_ether(".5").unwrap(), Wei(500_000_000_000_000_000));
        assert_eq!(Wei::parse_ether("0.000000000000000001").unwrap(), Wei(1));
        assert_eq!(Wei::parse_ether("0").unwrap(), Wei::ZERO);
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", "-1", "1e18", "abc", "1.2.3", ".", "0.0000000000000000001", " + 1"] {
            assert!(
                matches!(Wei::parse_ether(bad), Err(WalletError::InvalidAmount(_))),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn fixed_display_rounds_half_up() {
        assert_eq!(Wei(1_234_560_000_000_000_000).to_ether_fixed(4), "1.2346");
        assert_eq!(Wei(1_234_440_000_000_000_000).to_ether_fixed(4), "1.2344");
        assert_eq!(Wei(999_960_000_000_000_000).to_ether_fixed(4), "1.0000");
        assert_eq!(Wei::ZERO.to_ether_fixed(4), "0.0000");
        assert_eq!(Wei(5).to_ether_fixed(18), "0.000000000000000005");
    }

    #[test]
    fn exact_display_trims_zeros() {
        assert_eq!(Wei::parse_ether("1.500").unwrap().to_string(), "1.5");
        assert_eq!(Wei::from_gwei(20).to_gwei_string(), "20");
        assert_eq!(Wei(1_500_000_000).to_gwei_string(), "1.5");
    }
}
