//! Token identity and precision
//!
//! Addresses are kept as full 20-byte arrays so the swap plan can be handed
//! to an execution contract without re-parsing. Textual forms are accepted
//! in any case and always rendered lowercase.

use crate::error::{AmmError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest precision representable as a `Decimal` scale
pub const MAX_DECIMALS: u8 = 28;

/// 20-byte token address in canonical form
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = AmmError;

    fn from_str(s: &str) -> Result<Self> {
        let cleaned = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(cleaned, &mut bytes)
            .map_err(|e| AmmError::InvalidAddress(format!("{}: {}", s, e)))?;

        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A token with its decimal precision
///
/// Precision is fixed at construction; the registry refuses pools that
/// disagree with an already known precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Token {
    pub address: Address,
    decimals: u8,
}

impl Token {
    pub fn new(address: Address, decimals: u8) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(AmmError::math(format!(
                "token {} has {} decimals, max supported is {}",
                address, decimals, MAX_DECIMALS
            )));
        }
        Ok(Self { address, decimals })
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// One raw unit expressed in human units
    pub fn smallest_amount(&self) -> Decimal {
        Decimal::new(1, self.decimals as u32)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
