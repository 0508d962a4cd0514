//! Weighted product pool math with exact calculations
//!
//! Implements the Balancer weighted invariant `∏ B_k^w_k = const` for one
//! token pair. Prices are quoted as token-in per token-out with the swap fee
//! included, matching what a trader pays at the margin.

use crate::decimal_math::pow;
use crate::error::{AmmError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Largest exact-in trade as a share of the input balance
pub const MAX_IN_RATIO: Decimal = dec!(0.3);

/// Largest exact-out trade as a share of the output balance
pub const MAX_OUT_RATIO: Decimal = dec!(0.3);

/// Weighted pool math functions
pub struct WeightedMath;

impl WeightedMath {
    /// Calculate output amount for an exact input
    ///
    /// `out = Bo * (1 - (Bi / (Bi + a(1-f)))^(wi/wo))`
    ///
    /// # Arguments
    /// * `balance_in` / `balance_out` - pool balances in human units
    /// * `weight_in` / `weight_out` - normalized weights
    /// * `swap_fee` - fee fraction charged on the input
    /// * `amount_in` - input amount in human units
    pub fn calc_out_given_in(
        balance_in: Decimal,
        weight_in: Decimal,
        balance_out: Decimal,
        weight_out: Decimal,
        swap_fee: Decimal,
        amount_in: Decimal,
    ) -> Result<Decimal> {
        Self::check_pool(balance_in, weight_in, balance_out, weight_out)?;
        if amount_in.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let adjusted_in = amount_in * (Decimal::ONE - swap_fee);
        let base = balance_in / (balance_in + adjusted_in);
        let power = pow(base, weight_in / weight_out)?;

        Ok(balance_out * (Decimal::ONE - power))
    }

    /// Calculate required input for an exact output
    ///
    /// `in = Bi * ((Bo / (Bo - b))^(wo/wi) - 1) / (1 - f)`
    pub fn calc_in_given_out(
        balance_in: Decimal,
        weight_in: Decimal,
        balance_out: Decimal,
        weight_out: Decimal,
        swap_fee: Decimal,
        amount_out: Decimal,
    ) -> Result<Decimal> {
        Self::check_pool(balance_in, weight_in, balance_out, weight_out)?;
        if amount_out.is_zero() {
            return Ok(Decimal::ZERO);
        }
        if amount_out >= balance_out {
            return Err(AmmError::math(format!(
                "output {} drains balance {}",
                amount_out, balance_out
            )));
        }

        let base = balance_out / (balance_out - amount_out);
        let power = pow(base, weight_out / weight_in)?;

        Ok(balance_in * (power - Decimal::ONE) / (Decimal::ONE - swap_fee))
    }

    /// Spot price at zero trade size, token-in per token-out
    ///
    /// `(Bi / wi) / (Bo / wo) / (1 - f)`
    pub fn spot_price(
        balance_in: Decimal,
        weight_in: Decimal,
        balance_out: Decimal,
        weight_out: Decimal,
        swap_fee: Decimal,
    ) -> Result<Decimal> {
        Self::check_pool(balance_in, weight_in, balance_out, weight_out)?;
        Ok((balance_in / weight_in) / (balance_out / weight_out) / (Decimal::ONE - swap_fee))
    }

    /// Marginal price after an exact-in trade of `amount_in`
    ///
    /// Reciprocal of `d out / d in`:
    /// `(Bi + a') / (r * Bo * (1-f)) * ((Bi + a') / Bi)^r` with
    /// `a' = a(1-f)` and `r = wi/wo`.
    pub fn marginal_price_after_exact_in(
        balance_in: Decimal,
        weight_in: Decimal,
        balance_out: Decimal,
        weight_out: Decimal,
        swap_fee: Decimal,
        amount_in: Decimal,
    ) -> Result<Decimal> {
        Self::check_pool(balance_in, weight_in, balance_out, weight_out)?;

        let fee_multiplier = Decimal::ONE - swap_fee;
        let new_balance_in = balance_in + amount_in * fee_multiplier;
        let ratio = weight_in / weight_out;
        let growth = pow(new_balance_in / balance_in, ratio)?;

        Ok(new_balance_in / (ratio * balance_out * fee_multiplier) * growth)
    }

    /// Marginal price after an exact-out trade of `amount_out`
    ///
    /// `d in / d out = Bi * s * (Bo / (Bo - b))^s / ((Bo - b)(1-f))` with
    /// `s = wo/wi`.
    pub fn marginal_price_after_exact_out(
        balance_in: Decimal,
        weight_in: Decimal,
        balance_out: Decimal,
        weight_out: Decimal,
        swap_fee: Decimal,
        amount_out: Decimal,
    ) -> Result<Decimal> {
        Self::check_pool(balance_in, weight_in, balance_out, weight_out)?;
        if amount_out >= balance_out {
            return Err(AmmError::math(format!(
                "output {} drains balance {}",
                amount_out, balance_out
            )));
        }

        let ratio = weight_out / weight_in;
        let remaining = balance_out - amount_out;
        let growth = pow(balance_out / remaining, ratio)?;

        Ok(balance_in * ratio * growth / (remaining * (Decimal::ONE - swap_fee)))
    }

    fn check_pool(
        balance_in: Decimal,
        weight_in: Decimal,
        balance_out: Decimal,
        weight_out: Decimal,
    ) -> Result<()> {
        if balance_in <= Decimal::ZERO || balance_out <= Decimal::ZERO {
            return Err(AmmError::math("balances must be positive"));
        }
        if weight_in <= Decimal::ZERO || weight_out <= Decimal::ZERO {
            return Err(AmmError::math("weights must be positive"));
        }
        Ok(())
    }
}
