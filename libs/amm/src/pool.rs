//! Pool records and per-pair pricing views
//!
//! A [`Pool`] is validated once at construction and never mutated; a balance
//! refresh builds a new value via [`Pool::with_balances`]. Pricing works on
//! [`PoolPairData`], a narrow view over one (token in, token out) direction.

use crate::amount::SwapType;
use crate::error::{AmmError, Result};
use crate::token::{Address, Token};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Allowed deviation of a weighted pool's weight sum from 1
pub const WEIGHT_SUM_TOLERANCE: Decimal = dec!(0.000001);

/// Pool type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolKind {
    /// Balancer-style weighted product pool
    Weighted,
    /// StableSwap invariant pool with a shared amplification parameter
    Stable,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Weighted => write!(f, "Weighted"),
            PoolKind::Stable => write!(f, "Stable"),
        }
    }
}

/// One token's state inside a pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolToken {
    pub token: Token,
    /// Balance in human units
    pub balance: Decimal,
    /// Normalized weight, weighted pools only
    pub weight: Option<Decimal>,
}

/// A validated liquidity pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pool {
    id: String,
    kind: PoolKind,
    swap_fee: Decimal,
    amp: Option<Decimal>,
    tokens: Vec<PoolToken>,
}

impl Pool {
    /// Build a pool, rejecting malformed data
    pub fn new(
        id: impl Into<String>,
        kind: PoolKind,
        swap_fee: Decimal,
        amp: Option<Decimal>,
        tokens: Vec<PoolToken>,
    ) -> Result<Self> {
        let pool = Self {
            id: id.into(),
            kind,
            swap_fee,
            amp,
            tokens,
        };
        pool.validate()?;
        Ok(pool)
    }

    fn validate(&self) -> Result<()> {
        let id = self.id.as_str();

        if self.tokens.len() < 2 {
            return Err(AmmError::invalid(
                id,
                format!("pool needs at least 2 tokens, got {}", self.tokens.len()),
            ));
        }

        if self.swap_fee < Decimal::ZERO || self.swap_fee >= Decimal::ONE {
            return Err(AmmError::invalid(
                id,
                format!("swap fee {} outside [0, 1)", self.swap_fee),
            ));
        }

        for (i, pool_token) in self.tokens.iter().enumerate() {
            if pool_token.balance < Decimal::ZERO {
                return Err(AmmError::invalid(
                    id,
                    format!("negative balance for {}", pool_token.token),
                ));
            }
            if self.tokens[..i]
                .iter()
                .any(|other| other.token.address == pool_token.token.address)
            {
                return Err(AmmError::invalid(
                    id,
                    format!("duplicate token {}", pool_token.token),
                ));
            }
        }

        match self.kind {
            PoolKind::Weighted => {
                let mut sum = Decimal::ZERO;
                for pool_token in &self.tokens {
                    match pool_token.weight {
                        Some(w) if w > Decimal::ZERO => sum += w,
                        Some(w) => {
                            return Err(AmmError::invalid(
                                id,
                                format!("non-positive weight {} for {}", w, pool_token.token),
                            ))
                        }
                        None => {
                            return Err(AmmError::invalid(
                                id,
                                format!("missing weight for {}", pool_token.token),
                            ))
                        }
                    }
                }
                if (sum - Decimal::ONE).abs() > WEIGHT_SUM_TOLERANCE {
                    return Err(AmmError::invalid(
                        id,
                        format!("weights sum to {}, expected 1", sum),
                    ));
                }
            }
            PoolKind::Stable => match self.amp {
                Some(amp) if amp > Decimal::ZERO => {}
                _ => {
                    return Err(AmmError::invalid(
                        id,
                        "stable pool requires a positive amplification parameter",
                    ))
                }
            },
        }

        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn swap_fee(&self) -> Decimal {
        self.swap_fee
    }

    pub fn amp(&self) -> Option<Decimal> {
        self.amp
    }

    pub fn tokens(&self) -> &[PoolToken] {
        &self.tokens
    }

    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.tokens.iter().position(|t| &t.token.address == address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index_of(address).is_some()
    }

    /// Copy of this pool with replaced balances and, optionally, weights
    ///
    /// Both slices follow the pool's token order. The result is validated
    /// like a fresh pool.
    pub fn with_balances(&self, balances: &[Decimal], weights: Option<&[Decimal]>) -> Result<Self> {
        if balances.len() != self.tokens.len() {
            return Err(AmmError::invalid(
                &self.id,
                format!(
                    "refresh has {} balances for {} tokens",
                    balances.len(),
                    self.tokens.len()
                ),
            ));
        }
        if let Some(weights) = weights {
            if weights.len() != self.tokens.len() {
                return Err(AmmError::invalid(
                    &self.id,
                    format!(
                        "refresh has {} weights for {} tokens",
                        weights.len(),
                        self.tokens.len()
                    ),
                ));
            }
        }

        let tokens = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| PoolToken {
                token: t.token,
                balance: balances[i],
                weight: weights.map(|w| w[i]).or(t.weight),
            })
            .collect();

        Self::new(self.id.clone(), self.kind, self.swap_fee, self.amp, tokens)
    }
}

/// Curve parameters for one swap direction
#[derive(Debug, Clone, PartialEq)]
pub enum PairCurve {
    Weighted {
        balance_in: Decimal,
        balance_out: Decimal,
        weight_in: Decimal,
        weight_out: Decimal,
    },
    Stable {
        amp: Decimal,
        balances: Vec<Decimal>,
        index_in: usize,
        index_out: usize,
    },
}

/// Directional pricing view of a pool, derived on demand
#[derive(Debug, Clone, PartialEq)]
pub struct PoolPairData {
    pub pool_id: String,
    pub token_in: Token,
    pub token_out: Token,
    pub swap_fee: Decimal,
    pub curve: PairCurve,
    pub(crate) limit_in: Decimal,
    pub(crate) limit_out: Decimal,
}

impl PoolPairData {
    pub fn new(pool: &Pool, token_in: &Address, token_out: &Address) -> Result<Self> {
        let not_in_pool = |token: &Address| AmmError::TokenNotInPool {
            pool_id: pool.id.clone(),
            token: token.to_string(),
        };

        if token_in == token_out {
            return Err(AmmError::invalid(
                &pool.id,
                format!("cannot swap {} for itself", token_in),
            ));
        }

        let index_in = pool.index_of(token_in).ok_or_else(|| not_in_pool(token_in))?;
        let index_out = pool.index_of(token_out).ok_or_else(|| not_in_pool(token_out))?;
        let pool_in = &pool.tokens[index_in];
        let pool_out = &pool.tokens[index_out];

        let curve = match pool.kind {
            PoolKind::Weighted => PairCurve::Weighted {
                balance_in: pool_in.balance,
                balance_out: pool_out.balance,
                // Presence is guaranteed by Pool::validate
                weight_in: pool_in.weight.unwrap_or_default(),
                weight_out: pool_out.weight.unwrap_or_default(),
            },
            PoolKind::Stable => PairCurve::Stable {
                amp: pool.amp.unwrap_or_default(),
                balances: pool.tokens.iter().map(|t| t.balance).collect(),
                index_in,
                index_out,
            },
        };

        let mut pair = Self {
            pool_id: pool.id.clone(),
            token_in: pool_in.token,
            token_out: pool_out.token,
            swap_fee: pool.swap_fee,
            curve,
            limit_in: Decimal::ZERO,
            limit_out: Decimal::ZERO,
        };
        pair.limit_in = pair.compute_limit(SwapType::ExactIn);
        pair.limit_out = pair.compute_limit(SwapType::ExactOut);
        Ok(pair)
    }

    pub fn balance_in(&self) -> Decimal {
        match &self.curve {
            PairCurve::Weighted { balance_in, .. } => *balance_in,
            PairCurve::Stable {
                balances, index_in, ..
            } => balances[*index_in],
        }
    }

    pub fn balance_out(&self) -> Decimal {
        match &self.curve {
            PairCurve::Weighted { balance_out, .. } => *balance_out,
            PairCurve::Stable {
                balances, index_out, ..
            } => balances[*index_out],
        }
    }
}
