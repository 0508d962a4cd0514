//! # Cost Estimator - Gas Cost per Pool in Trade Tokens
//!
//! ## Purpose
//!
//! Converts the network gas price into the marginal cost, denominated in a
//! trade token, of routing through one more pool. The optimizer charges this
//! cost for every extra pool a plan uses, so splitting only happens when the
//! price improvement pays for the extra swaps.
//!
//! ## Integration Points
//!
//! - **Price Oracles**: [`TokenPriceOracle`] implementations supply how many
//!   tokens one unit of native currency buys; lookups run under a timeout
//! - **Router**: reads the cached cost for the output token (exact-in) or
//!   input token (exact-out) on every request
//! - **Fallback**: a failed or missing price degrades to zero cost with a
//!   warning, never to a routing failure
//!
//! ## Cost Model
//!
//! ```text
//! cost_per_swap = gas_price_wei * gas_units_per_swap / 1e18 * native_price_in_token
//! penalty       = cost_per_swap * (total_hops - 1)
//! ```

use crate::error::{Result, RouterError};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use sor_amm::{Address, Token};
use sor_config::RouterConfig;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wei per unit of native currency
const WEI_PER_NATIVE: Decimal = dec!(1000000000000000000);

/// Token cost of one extra pool swap
///
/// `native_price_in_token` is how many tokens one unit of native currency is
/// worth. A missing or non-positive price yields zero. Overflow saturates.
pub fn calibrate(
    gas_price_wei: u64,
    gas_units_per_swap: u64,
    native_price_in_token: Option<Decimal>,
) -> Decimal {
    let price = match native_price_in_token {
        Some(price) if price > Decimal::ZERO => price,
        _ => return Decimal::ZERO,
    };

    Decimal::from(gas_price_wei)
        .checked_div(WEI_PER_NATIVE)
        .and_then(|native_per_unit| native_per_unit.checked_mul(Decimal::from(gas_units_per_swap)))
        .and_then(|native_per_swap| native_per_swap.checked_mul(price))
        .unwrap_or(Decimal::MAX)
}

/// Gas penalty for a set of paths with `total_hops` hops in total
///
/// The first pool is part of any trade; every other pool costs one swap.
pub fn gas_penalty(cost_per_swap: Decimal, total_hops: usize) -> Decimal {
    if total_hops <= 1 {
        return Decimal::ZERO;
    }
    cost_per_swap
        .checked_mul(Decimal::from(total_hops - 1))
        .unwrap_or(Decimal::MAX)
}

/// Cached cost state for one token
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub gas_price_wei: u64,
    pub native_price_in_token: Option<Decimal>,
    pub cost_per_swap: Decimal,
    /// Set by [`CostEstimator::set_cost_output_token`]; never rescaled
    pub manual: bool,
}

impl Calibration {
    /// True when the cost fell back to zero for lack of a price
    pub fn is_degraded(&self) -> bool {
        !self.manual && self.native_price_in_token.is_none()
    }
}

/// Source of native-currency prices expressed in a token
#[async_trait]
pub trait TokenPriceOracle: Send + Sync {
    /// How many `token` one unit of native currency buys
    async fn native_price_in_token(&self, token: &Token) -> Result<Decimal>;
}

/// Oracle answering from a fixed price table
#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
    prices: HashMap<Address, Decimal>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, token: Address, native_price_in_token: Decimal) -> Self {
        self.prices.insert(token, native_price_in_token);
        self
    }
}

#[async_trait]
impl TokenPriceOracle for FixedPriceOracle {
    async fn native_price_in_token(&self, token: &Token) -> Result<Decimal> {
        self.prices
            .get(&token.address)
            .copied()
            .ok_or_else(|| RouterError::CalibrationUnavailable(format!("no price for {}", token)))
    }
}

/// Per-token cost cache shared by all routing calls
#[derive(Debug)]
pub struct CostEstimator {
    gas_units_per_swap: u64,
    timeout: Duration,
    calibrations: RwLock<HashMap<Address, Calibration>>,
}

impl CostEstimator {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            gas_units_per_swap: config.gas_units_per_swap,
            timeout: Duration::from_millis(config.calibration_timeout_ms),
            calibrations: RwLock::new(HashMap::new()),
        }
    }

    /// Compute and cache the cost for `token`, replacing any earlier value
    pub fn calibrate(
        &self,
        token: &Token,
        gas_price_wei: u64,
        native_price_in_token: Option<Decimal>,
    ) -> Calibration {
        // A non-positive price is no price
        let native_price_in_token = native_price_in_token.filter(|price| *price > Decimal::ZERO);
        let calibration = Calibration {
            gas_price_wei,
            native_price_in_token,
            cost_per_swap: calibrate(gas_price_wei, self.gas_units_per_swap, native_price_in_token),
            manual: false,
        };

        if calibration.is_degraded() {
            warn!("No native price for {}, gas cost treated as zero", token);
        } else {
            info!(
                "Calibrated {}: {} per swap at {} wei",
                token, calibration.cost_per_swap, gas_price_wei
            );
        }

        self.calibrations.write().insert(token.address, calibration);
        calibration
    }

    /// Look up the native price once and cache the resulting cost
    ///
    /// Oracle errors and timeouts degrade to a zero cost.
    pub async fn calibrate_with_oracle(
        &self,
        oracle: &dyn TokenPriceOracle,
        token: &Token,
        gas_price_wei: u64,
    ) -> Calibration {
        let price = match tokio::time::timeout(self.timeout, oracle.native_price_in_token(token)).await {
            Ok(Ok(price)) => Some(price),
            Ok(Err(e)) => {
                warn!("Price lookup for {} failed: {}", token, e);
                None
            }
            Err(_) => {
                warn!("Price lookup for {} timed out after {:?}", token, self.timeout);
                None
            }
        };

        self.calibrate(token, gas_price_wei, price)
    }

    /// Fix the cost for `token`, bypassing gas price and oracle
    pub fn set_cost_output_token(&self, token: &Token, cost_per_swap: Decimal) {
        debug!("Manual cost for {}: {} per swap", token, cost_per_swap);
        self.calibrations.write().insert(
            token.address,
            Calibration {
                gas_price_wei: 0,
                native_price_in_token: None,
                cost_per_swap: cost_per_swap.max(Decimal::ZERO),
                manual: true,
            },
        );
    }

    pub fn calibration(&self, token: &Address) -> Option<Calibration> {
        self.calibrations.read().get(token).copied()
    }

    /// Cost per extra pool for `token`
    ///
    /// A request gas price rescales calibrated costs; manual costs are
    /// returned as set. Fails when the token was never calibrated or its
    /// calibration had no price.
    pub fn cost_per_swap(&self, token: &Address, gas_price_override: Option<u64>) -> Result<Decimal> {
        let calibration = self.calibration(token).ok_or_else(|| {
            RouterError::CalibrationUnavailable(format!("{} was never calibrated", token))
        })?;

        if calibration.is_degraded() {
            return Err(RouterError::CalibrationUnavailable(format!(
                "no native price for {}",
                token
            )));
        }

        Ok(match gas_price_override {
            Some(gas_price_wei) if !calibration.manual => calibrate(
                gas_price_wei,
                self.gas_units_per_swap,
                calibration.native_price_in_token,
            ),
            _ => calibration.cost_per_swap,
        })
    }
}
