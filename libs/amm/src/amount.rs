//! Fixed-point swap amounts
//!
//! Amounts travel as raw integers scaled by the token precision. Pricing
//! works on human-unit `Decimal`s; conversion in either direction is exact
//! up to the token precision, with the rounding direction chosen by the
//! caller (down for amounts received, up for amounts owed).

use crate::error::{AmmError, Result};
use crate::token::Token;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the trade is fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapType {
    /// Input amount fixed, output solved for
    ExactIn,
    /// Output amount fixed, input solved for
    ExactOut,
}

impl fmt::Display for SwapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapType::ExactIn => write!(f, "exact-in"),
            SwapType::ExactOut => write!(f, "exact-out"),
        }
    }
}

/// Non-negative raw amount of a specific token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SwapAmount {
    pub token: Token,
    pub raw: u128,
}

impl SwapAmount {
    pub fn new(token: Token, raw: u128) -> Self {
        Self { token, raw }
    }

    pub fn zero(token: Token) -> Self {
        Self { token, raw: 0 }
    }

    /// Human-unit amount, rounded toward zero at the token precision
    pub fn from_decimal(token: Token, value: Decimal) -> Result<Self> {
        Self::from_decimal_with(token, value, RoundingStrategy::ToZero)
    }

    /// Human-unit amount, rounded away from zero at the token precision
    pub fn from_decimal_round_up(token: Token, value: Decimal) -> Result<Self> {
        Self::from_decimal_with(token, value, RoundingStrategy::AwayFromZero)
    }

    fn from_decimal_with(token: Token, value: Decimal, strategy: RoundingStrategy) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmmError::math(format!("negative amount {} for {}", value, token)));
        }

        let scale = token.decimals() as u32;
        let mut scaled = value.round_dp_with_strategy(scale, strategy);
        scaled.rescale(scale);
        if scaled.scale() != scale {
            return Err(AmmError::math(format!(
                "amount {} cannot be represented with {} decimals",
                value, scale
            )));
        }

        let raw = scaled
            .mantissa()
            .to_u128()
            .ok_or_else(|| AmmError::math(format!("amount {} out of range", value)))?;

        Ok(Self { token, raw })
    }

    /// Convert to human units
    pub fn to_decimal(&self) -> Result<Decimal> {
        let mantissa = i128::try_from(self.raw)
            .map_err(|_| AmmError::math(format!("raw amount {} out of range", self.raw)))?;
        Decimal::try_from_i128_with_scale(mantissa, self.token.decimals() as u32)
            .map_err(|e| AmmError::math(format!("raw amount {} out of range: {}", self.raw, e)))
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }
}

impl fmt::Display for SwapAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Ok(value) => write!(f, "{} {}", value, self.token),
            Err(_) => write!(f, "{} raw {}", self.raw, self.token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Address;
    use rust_decimal_macros::dec;

    fn usdc() -> Token {
        Token::new(Address([0xc2; 20]), 6).unwrap()
    }

    fn weth() -> Token {
        Token::new(Address([0xdf; 20]), 18).unwrap()
    }

    #[test]
    fn test_from_decimal_scales_by_precision() {
        let amount = SwapAmount::from_decimal(usdc(), dec!(7)).unwrap();
        assert_eq!(amount.raw, 7_000_000);

        let amount = SwapAmount::from_decimal(weth(), dec!(1.5)).unwrap();
        assert_eq!(amount.raw, 1_500_000_000_000_000_000);
    }

    #[test]
    fn test_rounding_direction() {
        let down = SwapAmount::from_decimal(usdc(), dec!(1.0000019)).unwrap();
        let up = SwapAmount::from_decimal_round_up(usdc(), dec!(1.0000011)).unwrap();

        assert_eq!(down.raw, 1_000_001);
        assert_eq!(up.raw, 1_000_002);
    }

    #[test]
    fn test_to_decimal_is_exact() {
        let amount = SwapAmount::new(weth(), 1_234_567_890_123_456_789);
        assert_eq!(amount.to_decimal().unwrap(), dec!(1.234567890123456789));
    }

    #[test]
    fn test_negative_rejected() {
        assert!(SwapAmount::from_decimal(usdc(), dec!(-1)).is_err());
    }
}
