//! Request entry point
//!
//! [`SmartOrderRouter`] wires one request through the pipeline: pair
//! filtering, path enumeration, gas-aware allocation and plan building.
//! Routing itself is synchronous and reads one pool set for its whole run.

use crate::cost::CostEstimator;
use crate::error::{Result, RouteWarning, RouterError};
use crate::optimizer::AllocationOptimizer;
use crate::paths::PathFinder;
use crate::plan::{build_plan, SwapPlan};
use crate::registry::{PoolRegistry, PoolSet};
use rust_decimal::Decimal;
use serde::Serialize;
use sor_amm::{Address, SwapAmount, SwapType};
use sor_config::{defaults, RouterConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One routing request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub swap_type: SwapType,
    /// Input for exact-in, output for exact-out
    pub amount: SwapAmount,
    /// Overrides the configured hop limit
    pub max_hops: Option<usize>,
    /// Rescales the calibrated gas cost for this request
    pub gas_price_wei: Option<u64>,
}

impl RouteRequest {
    pub fn new(token_in: Address, token_out: Address, swap_type: SwapType, amount: SwapAmount) -> Self {
        Self {
            token_in,
            token_out,
            swap_type,
            amount,
            max_hops: None,
            gas_price_wei: None,
        }
    }

    /// Token the gas cost is charged in
    pub fn cost_token(&self) -> Address {
        match self.swap_type {
            SwapType::ExactIn => self.token_out,
            SwapType::ExactOut => self.token_in,
        }
    }

    /// Token the requested amount is denominated in
    pub fn amount_token(&self) -> Address {
        match self.swap_type {
            SwapType::ExactIn => self.token_in,
            SwapType::ExactOut => self.token_out,
        }
    }
}

/// Smart order router over a shared pool registry
#[derive(Debug, Clone)]
pub struct SmartOrderRouter {
    config: RouterConfig,
    registry: Arc<PoolRegistry>,
    costs: Arc<CostEstimator>,
}

impl SmartOrderRouter {
    pub fn new(config: RouterConfig, registry: Arc<PoolRegistry>, costs: Arc<CostEstimator>) -> Self {
        Self {
            config,
            registry,
            costs,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn costs(&self) -> &Arc<CostEstimator> {
        &self.costs
    }

    /// Route against the registry's current pool set
    pub fn route(&self, request: &RouteRequest) -> Result<SwapPlan> {
        let pools = self.registry.snapshot();
        if !pools.finished_fetching_on_chain() {
            debug!("Routing on snapshot balances, on-chain refresh not applied");
        }
        self.route_with_pools(&pools, request)
    }

    /// Route against an explicit pool set
    pub fn route_with_pools(&self, pools: &PoolSet, request: &RouteRequest) -> Result<SwapPlan> {
        let max_hops = request.max_hops.unwrap_or(self.config.max_hops);
        if max_hops == 0 || max_hops > defaults::HOP_CEILING {
            return Err(RouterError::InvalidRequest(format!(
                "max_hops must be between 1 and {}, got {}",
                defaults::HOP_CEILING,
                max_hops
            )));
        }
        if request.token_in == request.token_out {
            return Err(RouterError::InvalidRequest(format!(
                "token in and token out are both {}",
                request.token_in
            )));
        }

        let no_route = || RouterError::NoRoute {
            token_in: request.token_in,
            token_out: request.token_out,
            max_hops,
        };
        let token_in = pools.token(&request.token_in).ok_or_else(no_route)?;
        let token_out = pools.token(&request.token_out).ok_or_else(no_route)?;
        let amount_token = match request.swap_type {
            SwapType::ExactIn => token_in,
            SwapType::ExactOut => token_out,
        };
        if request.amount.token != amount_token {
            return Err(RouterError::InvalidRequest(format!(
                "{} amount must be in {} with {} decimals, got {} with {}",
                request.swap_type,
                amount_token,
                amount_token.decimals(),
                request.amount.token,
                request.amount.token.decimals()
            )));
        }
        let amount = request.amount;

        if amount.is_zero() {
            debug!("Zero amount request, returning empty plan");
            return Ok(SwapPlan::empty(request.swap_type, request.token_in, request.token_out));
        }

        let filtered = pools.filter_for_pair(&request.token_in, &request.token_out, max_hops);
        let paths = PathFinder::new(max_hops, self.config.max_candidate_paths).find_paths(
            &filtered,
            &request.token_in,
            &request.token_out,
        );
        if paths.is_empty() {
            return Err(no_route());
        }

        let mut warnings = Vec::new();
        let cost_token = request.cost_token();
        let cost_per_swap = match self.costs.cost_per_swap(&cost_token, request.gas_price_wei) {
            Ok(cost) => cost,
            Err(e) => {
                warn!("Gas cost ignored for this route: {}", e);
                warnings.push(RouteWarning::CalibrationUnavailable { token: cost_token });
                Decimal::ZERO
            }
        };

        let optimizer = AllocationOptimizer::new(&self.config, request.swap_type, cost_per_swap);
        let allocation = optimizer.optimize(paths, amount.to_decimal()?)?;

        let mut plan = build_plan(&allocation, amount, token_in, token_out)?;
        warnings.append(&mut plan.warnings);
        plan.warnings = warnings;

        info!(
            "Routed {} {} -> {}: {} swaps, return {}",
            request.swap_type,
            request.token_in,
            request.token_out,
            plan.swaps.len(),
            plan.return_amount
        );

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PoolRecord, TokenRecord};
    use rust_decimal_macros::dec;
    use sor_amm::Token;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn amount(byte: u8, raw: u128) -> SwapAmount {
        SwapAmount::new(Token::new(addr(byte), 18).unwrap(), raw)
    }

    fn record(id: &str, a: u8, b: u8) -> PoolRecord {
        PoolRecord {
            id: id.to_string(),
            pool_type: "Weighted".to_string(),
            swap_fee: dec!(0.003),
            amp: None,
            tokens: [a, b]
                .iter()
                .map(|&t| TokenRecord {
                    address: addr(t).to_string(),
                    balance: dec!(1000),
                    decimals: 18,
                    weight: Some(dec!(0.5)),
                })
                .collect(),
        }
    }

    fn router(records: &[PoolRecord]) -> SmartOrderRouter {
        let config = RouterConfig::default();
        let registry = Arc::new(PoolRegistry::new());
        registry.load_snapshot(records);
        let costs = Arc::new(CostEstimator::new(&config));
        SmartOrderRouter::new(config, registry, costs)
    }

    #[test]
    fn test_cost_token_follows_swap_type() {
        let exact_in = RouteRequest::new(addr(1), addr(2), SwapType::ExactIn, amount(1, 1));
        assert_eq!(exact_in.cost_token(), addr(2));
        assert_eq!(exact_in.amount_token(), addr(1));

        let exact_out = RouteRequest::new(addr(1), addr(2), SwapType::ExactOut, amount(2, 1));
        assert_eq!(exact_out.cost_token(), addr(1));
        assert_eq!(exact_out.amount_token(), addr(2));
    }

    #[test]
    fn test_invalid_requests() {
        let router = router(&[record("p", 1, 2)]);

        let same = RouteRequest::new(addr(1), addr(1), SwapType::ExactIn, amount(1, 1));
        assert!(matches!(router.route(&same), Err(RouterError::InvalidRequest(_))));

        let mut too_deep = RouteRequest::new(addr(1), addr(2), SwapType::ExactIn, amount(1, 1));
        too_deep.max_hops = Some(defaults::HOP_CEILING + 1);
        assert!(matches!(router.route(&too_deep), Err(RouterError::InvalidRequest(_))));

        // Amount denominated in the wrong token
        let wrong_token = RouteRequest::new(addr(1), addr(2), SwapType::ExactIn, amount(2, 1));
        assert!(matches!(router.route(&wrong_token), Err(RouterError::InvalidRequest(_))));

        // Amount with the wrong precision
        let usdc_like = SwapAmount::new(Token::new(addr(1), 6).unwrap(), 1);
        let wrong_decimals = RouteRequest::new(addr(1), addr(2), SwapType::ExactIn, usdc_like);
        assert!(matches!(router.route(&wrong_decimals), Err(RouterError::InvalidRequest(_))));
    }

    #[test]
    fn test_unknown_token_is_no_route() {
        let router = router(&[record("p", 1, 2)]);
        let request = RouteRequest::new(addr(1), addr(9), SwapType::ExactIn, amount(1, 1_000));
        assert!(matches!(router.route(&request), Err(RouterError::NoRoute { .. })));
    }

    #[test]
    fn test_uncalibrated_cost_token_warns() {
        let router = router(&[record("p", 1, 2)]);
        let request = RouteRequest::new(
            addr(1),
            addr(2),
            SwapType::ExactIn,
            amount(1, 1_000_000_000_000_000_000),
        );

        let plan = router.route(&request).unwrap();
        assert_eq!(plan.swaps.len(), 1);
        assert_eq!(
            plan.warnings,
            vec![RouteWarning::CalibrationUnavailable { token: addr(2) }]
        );
    }

    #[test]
    fn test_zero_amount_returns_empty_plan() {
        let router = router(&[record("p", 1, 2)]);
        let request = RouteRequest::new(addr(1), addr(2), SwapType::ExactOut, amount(2, 0));

        let plan = router.route(&request).unwrap();
        assert!(plan.is_empty());
        assert!(plan.warnings.is_empty());
    }
}
