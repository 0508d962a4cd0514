//! Swap plan construction
//!
//! Turns a decimal [`Allocation`] into integer swap steps at token precision.
//! Amounts received are rounded down and amounts owed are rounded up, so the
//! plan never promises more than the pools deliver.

use crate::error::{Result, RouteWarning, RouterError};
use crate::optimizer::{Allocation, Route};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};
use sor_amm::{Address, PoolPricing, SwapAmount, SwapType, Token};
use tracing::debug;

fn raw_as_string<S: Serializer>(raw: &u128, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(raw)
}

/// One elementary pool swap
///
/// `amount` is the fixed side of the step (input for exact-in, output for
/// exact-out) and `return_amount` the solved side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStep {
    pub pool_id: String,
    pub token_in_index: usize,
    pub token_out_index: usize,
    #[serde(serialize_with = "raw_as_string")]
    pub amount: u128,
    #[serde(serialize_with = "raw_as_string")]
    pub return_amount: u128,
}

/// Ordered swaps ready for one batch execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPlan {
    pub swap_type: SwapType,
    pub token_in: Address,
    pub token_out: Address,
    pub swaps: Vec<SwapStep>,
    /// Every token the swaps touch, first-seen order
    pub token_addresses: Vec<Address>,
    /// Requested amount, raw
    #[serde(serialize_with = "raw_as_string")]
    pub swap_amount: u128,
    /// Total output (exact-in) or input (exact-out), raw
    #[serde(serialize_with = "raw_as_string")]
    pub return_amount: u128,
    /// `return_amount` in human units net of the gas penalty
    pub return_amount_considering_fees: Decimal,
    pub market_spot_price: Option<Decimal>,
    pub warnings: Vec<RouteWarning>,
}

impl SwapPlan {
    /// Plan with no swaps, used for zero-amount requests
    pub fn empty(swap_type: SwapType, token_in: Address, token_out: Address) -> Self {
        Self {
            swap_type,
            token_in,
            token_out,
            swaps: Vec::new(),
            token_addresses: Vec::new(),
            swap_amount: 0,
            return_amount: 0,
            return_amount_considering_fees: Decimal::ZERO,
            market_spot_price: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    /// Amount sent in, raw
    pub fn amount_in(&self) -> u128 {
        match self.swap_type {
            SwapType::ExactIn => self.swap_amount,
            SwapType::ExactOut => self.return_amount,
        }
    }

    /// Amount received, raw
    pub fn amount_out(&self) -> u128 {
        match self.swap_type {
            SwapType::ExactIn => self.return_amount,
            SwapType::ExactOut => self.swap_amount,
        }
    }

    /// Batch limits aligned with `token_addresses`
    ///
    /// Positive entries cap what is sent, negative entries floor what is
    /// received, intermediates are zero. `slippage` widens the solved side.
    pub fn limits(&self, slippage: Decimal) -> Result<Vec<i128>> {
        if slippage < Decimal::ZERO || slippage >= Decimal::ONE {
            return Err(RouterError::InvalidRequest(format!(
                "slippage {} outside [0, 1)",
                slippage
            )));
        }

        let mut limits = vec![0i128; self.token_addresses.len()];
        if self.is_empty() {
            return Ok(limits);
        }

        let (max_in, min_out) = match self.swap_type {
            SwapType::ExactIn => (
                to_i128(self.swap_amount)?,
                scale_raw(self.return_amount, Decimal::ONE - slippage, RoundingStrategy::ToZero)?,
            ),
            SwapType::ExactOut => (
                scale_raw(self.return_amount, Decimal::ONE + slippage, RoundingStrategy::AwayFromZero)?,
                to_i128(self.swap_amount)?,
            ),
        };

        for (limit, address) in limits.iter_mut().zip(&self.token_addresses) {
            if *address == self.token_in {
                *limit = max_in;
            } else if *address == self.token_out {
                *limit = -min_out;
            }
        }
        Ok(limits)
    }
}

fn to_i128(raw: u128) -> Result<i128> {
    i128::try_from(raw)
        .map_err(|_| RouterError::InvalidRequest(format!("raw amount {} out of range", raw)))
}

fn scale_raw(raw: u128, factor: Decimal, strategy: RoundingStrategy) -> Result<i128> {
    Decimal::from_u128(raw)
        .and_then(|value| value.checked_mul(factor))
        .map(|value| value.round_dp_with_strategy(0, strategy))
        .and_then(|value| value.to_i128())
        .ok_or_else(|| RouterError::InvalidRequest(format!("raw amount {} out of range", raw)))
}

/// Split `total` raw units in proportion to the decimal route amounts
///
/// Each share is truncated; the residue goes to the largest share so the
/// shares sum exactly to `total`.
fn raw_shares(routes: &[Route], token: Token, total: u128) -> Result<Vec<u128>> {
    let mut shares = routes
        .iter()
        .map(|route| Ok(SwapAmount::from_decimal(token, route.amount)?.raw))
        .collect::<Result<Vec<u128>>>()?;

    let allocated: u128 = shares.iter().sum();
    if let Some(largest) = (0..shares.len()).max_by_key(|&i| (shares[i], std::cmp::Reverse(i))) {
        if allocated <= total {
            shares[largest] += total - allocated;
        } else {
            shares[largest] = shares[largest].saturating_sub(allocated - total);
        }
    }
    Ok(shares)
}

/// Builds swap plans against a growing token table
struct PlanBuilder {
    swaps: Vec<SwapStep>,
    token_addresses: Vec<Address>,
}

impl PlanBuilder {
    fn token_index(&mut self, address: Address) -> usize {
        match self.token_addresses.iter().position(|a| *a == address) {
            Some(index) => index,
            None => {
                self.token_addresses.push(address);
                self.token_addresses.len() - 1
            }
        }
    }

    fn push_step(&mut self, pool_id: &str, token_in: Address, token_out: Address, amount: u128, return_amount: u128) {
        let token_in_index = self.token_index(token_in);
        let token_out_index = self.token_index(token_out);
        self.swaps.push(SwapStep {
            pool_id: pool_id.to_string(),
            token_in_index,
            token_out_index,
            amount,
            return_amount,
        });
    }

    /// Forward pass, outputs rounded down; returns the path output
    fn exact_in_route(&mut self, route: &Route, raw_in: u128) -> Result<u128> {
        let mut raw = raw_in;
        for hop in route.path.hops() {
            let amount = SwapAmount::new(hop.token_in, raw).to_decimal()?;
            let out = SwapAmount::from_decimal(hop.token_out, hop.amount_out(amount)?)?;
            self.push_step(&hop.pool_id, hop.token_in.address, hop.token_out.address, raw, out.raw);
            raw = out.raw;
        }
        Ok(raw)
    }

    /// Backward pass, inputs rounded up; returns the path input
    fn exact_out_route(&mut self, route: &Route, raw_out: u128) -> Result<u128> {
        let mut steps = Vec::with_capacity(route.path.hop_count());
        let mut raw = raw_out;
        for hop in route.path.hops().iter().rev() {
            let amount = SwapAmount::new(hop.token_out, raw).to_decimal()?;
            let needed = SwapAmount::from_decimal_round_up(hop.token_in, hop.amount_in(amount)?)?;
            steps.push((hop, raw, needed.raw));
            raw = needed.raw;
        }

        // Register tokens in hop order so the table stays first-seen
        for (hop, out, needed) in steps.into_iter().rev() {
            self.push_step(&hop.pool_id, hop.token_in.address, hop.token_out.address, out, needed);
        }
        Ok(raw)
    }
}

/// A hop that cannot absorb its integer amount means the plan does not fit
fn liquidity_error(error: RouterError) -> RouterError {
    match error {
        RouterError::Amm(e) if e.is_insufficient_liquidity() => {
            RouterError::InsufficientLiquidity(e.to_string())
        }
        other => other,
    }
}

/// Integer swap plan for an allocation of `amount`
pub fn build_plan(allocation: &Allocation, amount: SwapAmount, token_in: Token, token_out: Token) -> Result<SwapPlan> {
    let swap_type = allocation.swap_type;
    if amount.is_zero() || allocation.routes.is_empty() {
        return Ok(SwapPlan::empty(swap_type, token_in.address, token_out.address));
    }

    let shares = raw_shares(&allocation.routes, amount.token, amount.raw)?;

    let mut builder = PlanBuilder {
        swaps: Vec::new(),
        token_addresses: Vec::new(),
    };
    let mut return_amount: u128 = 0;

    for (route, &share) in allocation.routes.iter().zip(&shares) {
        if share == 0 {
            debug!("Route through {} rounds to zero, skipped", route.path.hops()[0].pool_id);
            continue;
        }
        let returned = match swap_type {
            SwapType::ExactIn => builder.exact_in_route(route, share),
            SwapType::ExactOut => builder.exact_out_route(route, share),
        }
        .map_err(liquidity_error)?;
        return_amount = return_amount
            .checked_add(returned)
            .ok_or_else(|| RouterError::InvalidRequest("return amount overflow".to_string()))?;
    }

    let return_token = match swap_type {
        SwapType::ExactIn => token_out,
        SwapType::ExactOut => token_in,
    };
    let returned = SwapAmount::new(return_token, return_amount).to_decimal()?;
    let return_amount_considering_fees = match swap_type {
        SwapType::ExactIn => returned - allocation.gas_penalty,
        SwapType::ExactOut => returned + allocation.gas_penalty,
    };

    debug!(
        "Built plan with {} swaps over {} tokens, return {}",
        builder.swaps.len(),
        builder.token_addresses.len(),
        return_amount
    );

    Ok(SwapPlan {
        swap_type,
        token_in: token_in.address,
        token_out: token_out.address,
        swaps: builder.swaps,
        token_addresses: builder.token_addresses,
        swap_amount: amount.raw,
        return_amount,
        return_amount_considering_fees,
        market_spot_price: allocation.market_spot_price,
        warnings: allocation.warnings.clone(),
    })
}
