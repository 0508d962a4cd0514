//! Pricing contract shared by every pool kind
//!
//! Dispatch is a closed match over [`PairCurve`]; a new pool kind adds a
//! variant and its arms here, not a new implementor.

use crate::amount::SwapType;
use crate::error::{AmmError, Result};
use crate::pool::{PairCurve, PoolPairData};
use crate::stable_math::{self, StableMath};
use crate::weighted_math::{self, WeightedMath};
use rust_decimal::Decimal;
use tracing::debug;

/// Unified pricing interface over a directional pool view
///
/// Amounts and prices are human-unit `Decimal`s. Prices are token-in per
/// token-out with the fee included.
pub trait PoolPricing {
    /// Marginal price at zero trade size
    fn spot_price(&self) -> Result<Decimal>;

    /// Output for an exact input
    fn amount_out(&self, amount_in: Decimal) -> Result<Decimal>;

    /// Input required for an exact output
    fn amount_in(&self, amount_out: Decimal) -> Result<Decimal>;

    /// Marginal price once `amount` has traded
    ///
    /// For exact-in `amount` is the input and the result is `1 / (d out / d in)`;
    /// for exact-out `amount` is the output and the result is `d in / d out`.
    fn marginal_price_after_swap(&self, swap_type: SwapType, amount: Decimal) -> Result<Decimal>;

    /// Largest input (exact-in) or output (exact-out) the pool accepts
    fn limit_amount(&self, swap_type: SwapType) -> Result<Decimal>;
}

impl PoolPricing for PoolPairData {
    fn spot_price(&self) -> Result<Decimal> {
        self.ensure_liquid()?;
        match &self.curve {
            PairCurve::Weighted {
                balance_in,
                balance_out,
                weight_in,
                weight_out,
            } => WeightedMath::spot_price(
                *balance_in,
                *weight_in,
                *balance_out,
                *weight_out,
                self.swap_fee,
            ),
            PairCurve::Stable {
                amp,
                balances,
                index_in,
                index_out,
            } => StableMath::spot_price(*amp, balances, *index_in, *index_out, self.swap_fee),
        }
    }

    fn amount_out(&self, amount_in: Decimal) -> Result<Decimal> {
        self.ensure_within_limit(SwapType::ExactIn, amount_in)?;
        match &self.curve {
            PairCurve::Weighted {
                balance_in,
                balance_out,
                weight_in,
                weight_out,
            } => WeightedMath::calc_out_given_in(
                *balance_in,
                *weight_in,
                *balance_out,
                *weight_out,
                self.swap_fee,
                amount_in,
            ),
            PairCurve::Stable {
                amp,
                balances,
                index_in,
                index_out,
            } => StableMath::calc_out_given_in(
                *amp,
                balances,
                *index_in,
                *index_out,
                self.swap_fee,
                amount_in,
            ),
        }
    }

    fn amount_in(&self, amount_out: Decimal) -> Result<Decimal> {
        if amount_out >= self.balance_out() && !amount_out.is_zero() {
            return Err(AmmError::insufficient(
                &self.pool_id,
                format!(
                    "output {} exceeds balance {} of {}",
                    amount_out,
                    self.balance_out(),
                    self.token_out
                ),
            ));
        }
        self.ensure_within_limit(SwapType::ExactOut, amount_out)?;
        match &self.curve {
            PairCurve::Weighted {
                balance_in,
                balance_out,
                weight_in,
                weight_out,
            } => WeightedMath::calc_in_given_out(
                *balance_in,
                *weight_in,
                *balance_out,
                *weight_out,
                self.swap_fee,
                amount_out,
            ),
            PairCurve::Stable {
                amp,
                balances,
                index_in,
                index_out,
            } => StableMath::calc_in_given_out(
                *amp,
                balances,
                *index_in,
                *index_out,
                self.swap_fee,
                amount_out,
            ),
        }
    }

    fn marginal_price_after_swap(&self, swap_type: SwapType, amount: Decimal) -> Result<Decimal> {
        self.ensure_within_limit(swap_type, amount)?;
        match (&self.curve, swap_type) {
            (
                PairCurve::Weighted {
                    balance_in,
                    balance_out,
                    weight_in,
                    weight_out,
                },
                SwapType::ExactIn,
            ) => WeightedMath::marginal_price_after_exact_in(
                *balance_in,
                *weight_in,
                *balance_out,
                *weight_out,
                self.swap_fee,
                amount,
            ),
            (
                PairCurve::Weighted {
                    balance_in,
                    balance_out,
                    weight_in,
                    weight_out,
                },
                SwapType::ExactOut,
            ) => WeightedMath::marginal_price_after_exact_out(
                *balance_in,
                *weight_in,
                *balance_out,
                *weight_out,
                self.swap_fee,
                amount,
            ),
            (
                PairCurve::Stable {
                    amp,
                    balances,
                    index_in,
                    index_out,
                },
                SwapType::ExactIn,
            ) => StableMath::marginal_price_after_exact_in(
                *amp,
                balances,
                *index_in,
                *index_out,
                self.swap_fee,
                amount,
            ),
            (
                PairCurve::Stable {
                    amp,
                    balances,
                    index_in,
                    index_out,
                },
                SwapType::ExactOut,
            ) => StableMath::marginal_price_after_exact_out(
                *amp,
                balances,
                *index_in,
                *index_out,
                self.swap_fee,
                amount,
            ),
        }
    }

    fn limit_amount(&self, swap_type: SwapType) -> Result<Decimal> {
        Ok(match swap_type {
            SwapType::ExactIn => self.limit_in,
            SwapType::ExactOut => self.limit_out,
        })
    }
}

impl PoolPairData {
    /// Trade size limits for this direction, computed once when the view is built
    pub(crate) fn compute_limit(&self, swap_type: SwapType) -> Decimal {
        if self.ensure_liquid().is_err() {
            return Decimal::ZERO;
        }
        let limit = self.curve_limit(swap_type).unwrap_or_else(|e| {
            debug!(pool_id = %self.pool_id, error = %e, "Pool limit unavailable, treating as empty");
            Decimal::ZERO
        });
        limit.max(Decimal::ZERO)
    }

    fn curve_limit(&self, swap_type: SwapType) -> Result<Decimal> {
        match (&self.curve, swap_type) {
            // Each side is capped by its own ratio and by what the other
            // side's cap allows, so the two limits describe the same trade
            (
                PairCurve::Weighted {
                    balance_in,
                    balance_out,
                    weight_in,
                    weight_out,
                },
                SwapType::ExactIn,
            ) => {
                let max_in = *balance_in * weighted_math::MAX_IN_RATIO;
                let in_for_max_out = WeightedMath::calc_in_given_out(
                    *balance_in,
                    *weight_in,
                    *balance_out,
                    *weight_out,
                    self.swap_fee,
                    *balance_out * weighted_math::MAX_OUT_RATIO,
                )?;
                Ok(max_in.min(in_for_max_out))
            }
            (
                PairCurve::Weighted {
                    balance_in,
                    balance_out,
                    weight_in,
                    weight_out,
                },
                SwapType::ExactOut,
            ) => {
                let max_out = *balance_out * weighted_math::MAX_OUT_RATIO;
                let out_for_max_in = WeightedMath::calc_out_given_in(
                    *balance_in,
                    *weight_in,
                    *balance_out,
                    *weight_out,
                    self.swap_fee,
                    *balance_in * weighted_math::MAX_IN_RATIO,
                )?;
                Ok(max_out.min(out_for_max_in))
            }
            (
                PairCurve::Stable {
                    amp,
                    balances,
                    index_in,
                    index_out,
                },
                SwapType::ExactIn,
            ) => StableMath::calc_in_given_out(
                *amp,
                balances,
                *index_in,
                *index_out,
                self.swap_fee,
                balances[*index_out] * stable_math::MAX_OUT_RATIO,
            ),
            (PairCurve::Stable { balances, index_out, .. }, SwapType::ExactOut) => {
                Ok(balances[*index_out] * stable_math::MAX_OUT_RATIO)
            }
        }
    }

    /// Every balance the curve reads must be positive
    fn ensure_liquid(&self) -> Result<()> {
        let empty = match &self.curve {
            PairCurve::Weighted {
                balance_in,
                balance_out,
                ..
            } => balance_in.is_zero() || balance_out.is_zero(),
            PairCurve::Stable { balances, .. } => balances.iter().any(|b| b.is_zero()),
        };
        if empty {
            return Err(AmmError::insufficient(&self.pool_id, "pool has an empty balance"));
        }
        Ok(())
    }

    fn ensure_within_limit(&self, swap_type: SwapType, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(AmmError::math(format!("negative trade amount {}", amount)));
        }
        if amount.is_zero() {
            return self.ensure_liquid();
        }
        let limit = self.limit_amount(swap_type)?;
        if amount > limit {
            return Err(AmmError::insufficient(
                &self.pool_id,
                format!("{} amount {} above pool limit {}", swap_type, amount, limit),
            ));
        }
        Ok(())
    }
}
