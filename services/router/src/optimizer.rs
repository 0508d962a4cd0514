//! Allocation optimizer with precise AMM math
//!
//! Splits a trade across candidate paths so every path that carries part of
//! it ends at the same marginal price, then picks how many paths to use by
//! scoring each split net of the gas penalty for the extra pools.
//!
//! ## Algorithm
//! - Rank candidates by what each would return alone at the full amount
//! - Build pool-disjoint active sets greedily from the ranking, one per size
//! - For each set, solve for the price level `P` at which the amounts that
//!   bring every path to `P` sum to the requested amount
//! - Keep the best net result, then drop single paths while that helps

use crate::cost::gas_penalty;
use crate::error::{Result, RouteWarning, RouterError};
use crate::paths::Path;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sor_amm::SwapType;
use sor_config::RouterConfig;
use tracing::{debug, warn};

/// Relative marginal-price precision of the per-path solve
const INNER_PRECISION: Decimal = dec!(0.0000000000000001);

/// Iteration cap of the per-path solve
const INNER_MAX_ITERATIONS: usize = 100;

/// Share of the convergence tolerance allowed as unallocated residue
const RESIDUE_FACTOR: Decimal = dec!(0.001);

/// One path with its share of the trade
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub path: Path,
    /// Path input for exact-in, path output for exact-out
    pub amount: Decimal,
}

/// Optimized split of a trade
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub swap_type: SwapType,
    /// Paths with a nonzero share, in ranking order
    pub routes: Vec<Route>,
    /// Total output (exact-in) or input (exact-out) before gas
    pub total_return: Decimal,
    pub gas_penalty: Decimal,
    /// `total_return` net of the gas penalty
    pub net_return: Decimal,
    /// Best spot price among usable candidates
    pub market_spot_price: Option<Decimal>,
    pub warnings: Vec<RouteWarning>,
}

#[derive(Debug, Clone)]
struct Candidate {
    path: Path,
    limit: Decimal,
    spot: Decimal,
    /// Marginal price at `limit`
    limit_price: Decimal,
}

#[derive(Debug, Clone)]
struct Evaluated {
    set: Vec<usize>,
    amounts: Vec<Decimal>,
    gross: Decimal,
    penalty: Decimal,
    net: Decimal,
    warning: Option<RouteWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    Lo,
    Hi,
}

/// Illinois-modified regula falsi over an increasing function
struct Bracket {
    lo: Decimal,
    f_lo: Decimal,
    hi: Decimal,
    f_hi: Decimal,
    last: Option<Side>,
}

impl Bracket {
    fn new(lo: Decimal, f_lo: Decimal, hi: Decimal, f_hi: Decimal) -> Self {
        Self {
            lo,
            f_lo,
            hi,
            f_hi,
            last: None,
        }
    }

    fn width(&self) -> Decimal {
        self.hi - self.lo
    }

    /// Next trial point, falling back to the midpoint when the secant is unusable
    fn next(&self) -> Decimal {
        let midpoint = self.lo + self.width() / dec!(2);
        let denominator = self.f_hi - self.f_lo;
        if denominator <= Decimal::ZERO {
            return midpoint;
        }

        let secant = (-self.f_lo)
            .checked_div(denominator)
            .and_then(|t| t.checked_mul(self.width()))
            .map(|step| self.lo + step);

        match secant {
            Some(x) if x > self.lo && x < self.hi => x,
            _ => midpoint,
        }
    }

    fn update(&mut self, x: Decimal, fx: Decimal) {
        if fx < Decimal::ZERO {
            self.lo = x;
            self.f_lo = fx;
            if self.last == Some(Side::Lo) {
                self.f_hi /= dec!(2);
            }
            self.last = Some(Side::Lo);
        } else {
            self.hi = x;
            self.f_hi = fx;
            if self.last == Some(Side::Hi) {
                self.f_lo /= dec!(2);
            }
            self.last = Some(Side::Hi);
        }
    }
}

/// Equal-marginal-price allocation across candidate paths
#[derive(Debug, Clone)]
pub struct AllocationOptimizer {
    swap_type: SwapType,
    cost_per_swap: Decimal,
    max_pools: usize,
    tolerance: Decimal,
    max_iterations: usize,
}

impl AllocationOptimizer {
    pub fn new(config: &RouterConfig, swap_type: SwapType, cost_per_swap: Decimal) -> Self {
        Self {
            swap_type,
            cost_per_swap,
            max_pools: config.max_pools,
            tolerance: config.convergence_tolerance,
            max_iterations: config.max_iterations,
        }
    }

    /// Best split of `amount` across `paths`
    ///
    /// `amount` is the path input for exact-in and the path output for
    /// exact-out. Fails with `InsufficientLiquidity` when no pool-disjoint
    /// set of paths can carry it.
    pub fn optimize(&self, paths: Vec<Path>, amount: Decimal) -> Result<Allocation> {
        if amount <= Decimal::ZERO {
            return Err(RouterError::InvalidRequest(format!(
                "allocation amount must be positive, got {}",
                amount
            )));
        }

        let candidates = self.prepare(paths);
        if candidates.is_empty() {
            return Err(RouterError::InsufficientLiquidity(
                "no candidate path has liquidity".to_string(),
            ));
        }
        let market_spot_price = candidates.iter().map(|c| c.spot).min();

        let ranking = self.rank(&candidates, amount);

        let mut best: Option<Evaluated> = None;
        for set in self.active_sets(&candidates, &ranking) {
            if !self.feasible(&candidates, &set, amount) {
                debug!("Skipping {}-path set: total limit below {}", set.len(), amount);
                continue;
            }
            match self.evaluate(&candidates, set, amount) {
                Ok(evaluated) => {
                    if best.as_ref().map_or(true, |b| self.better(&evaluated, b)) {
                        best = Some(evaluated);
                    }
                }
                Err(e) => debug!("Active set rejected: {}", e),
            }
        }

        let mut best = best.ok_or_else(|| {
            RouterError::InsufficientLiquidity(format!(
                "no set of up to {} paths can carry {}",
                self.max_pools, amount
            ))
        })?;

        // Drop single paths while that improves the net result
        while best.set.len() > 1 {
            let improved = (0..best.set.len()).find_map(|skip| {
                let mut set = best.set.clone();
                set.remove(skip);
                if !self.feasible(&candidates, &set, amount) {
                    return None;
                }
                self.evaluate(&candidates, set, amount)
                    .ok()
                    .filter(|evaluated| self.better(evaluated, &best))
            });
            match improved {
                Some(evaluated) => best = evaluated,
                None => break,
            }
        }

        if let Some(warning) = &best.warning {
            warn!("Using best allocation found: {:?}", warning);
        }

        let routes = best
            .set
            .iter()
            .zip(&best.amounts)
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(&c, &amount)| Route {
                path: candidates[c].path.clone(),
                amount,
            })
            .collect::<Vec<_>>();

        debug!(
            "Allocated {} across {} paths: return {}, gas {}, net {}",
            amount,
            routes.len(),
            best.gross,
            best.penalty,
            best.net
        );

        Ok(Allocation {
            swap_type: self.swap_type,
            routes,
            total_return: best.gross,
            gas_penalty: best.penalty,
            net_return: best.net,
            market_spot_price,
            warnings: best.warning.into_iter().collect(),
        })
    }

    fn prepare(&self, paths: Vec<Path>) -> Vec<Candidate> {
        paths
            .into_iter()
            .filter_map(|path| {
                let priced = path.limit_amount(self.swap_type).and_then(|limit| {
                    let spot = path.spot_price()?;
                    let limit_price = path.marginal_price(self.swap_type, limit)?;
                    Ok((limit, spot, limit_price))
                });
                match priced {
                    Ok((limit, spot, limit_price)) if limit > Decimal::ZERO => Some(Candidate {
                        path,
                        limit,
                        spot,
                        limit_price,
                    }),
                    Ok(_) => None,
                    Err(e) => {
                        debug!("Dropping candidate path: {}", e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Candidate indices, best first
    fn rank(&self, candidates: &[Candidate], amount: Decimal) -> Vec<usize> {
        let single_scores: Vec<Option<Decimal>> = candidates
            .iter()
            .map(|candidate| {
                if candidate.limit < amount {
                    return None;
                }
                let gross = self.gross(&candidate.path, amount).ok()?;
                let penalty = gas_penalty(self.cost_per_swap, candidate.path.hop_count());
                Some(self.score(self.net(gross, penalty)))
            })
            .collect();

        let mut ranking: Vec<usize> = (0..candidates.len()).collect();
        ranking.sort_by(|&a, &b| match (single_scores[a], single_scores[b]) {
            (Some(sa), Some(sb)) => sb.cmp(&sa),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => candidates[a].spot.cmp(&candidates[b].spot),
        });
        ranking
    }

    /// Greedy pool-disjoint prefixes of the ranking, sizes 1 to `max_pools`
    fn active_sets(&self, candidates: &[Candidate], ranking: &[usize]) -> Vec<Vec<usize>> {
        let mut chosen: Vec<usize> = Vec::new();
        let mut sets = Vec::new();
        for &index in ranking {
            if chosen.len() >= self.max_pools {
                break;
            }
            if chosen
                .iter()
                .any(|&c| candidates[c].path.shares_pool_with(&candidates[index].path))
            {
                continue;
            }
            chosen.push(index);
            sets.push(chosen.clone());
        }
        sets
    }

    fn feasible(&self, candidates: &[Candidate], set: &[usize], amount: Decimal) -> bool {
        let total: Decimal = set.iter().map(|&c| candidates[c].limit).sum();
        total >= amount
    }

    fn evaluate(&self, candidates: &[Candidate], set: Vec<usize>, amount: Decimal) -> Result<Evaluated> {
        let (amounts, warning) = self.allocate(candidates, &set, amount)?;

        let mut gross = Decimal::ZERO;
        let mut hops = 0usize;
        for (&c, &share) in set.iter().zip(&amounts) {
            if share.is_zero() {
                continue;
            }
            gross += self.gross(&candidates[c].path, share)?;
            hops += candidates[c].path.hop_count();
        }
        let penalty = gas_penalty(self.cost_per_swap, hops);

        Ok(Evaluated {
            set,
            amounts,
            gross,
            penalty,
            net: self.net(gross, penalty),
            warning,
        })
    }

    /// Equal-marginal-price split of `amount` over `set`
    fn allocate(
        &self,
        candidates: &[Candidate],
        set: &[usize],
        amount: Decimal,
    ) -> Result<(Vec<Decimal>, Option<RouteWarning>)> {
        if set.len() == 1 {
            return Ok((vec![amount], None));
        }

        let members: Vec<&Candidate> = set.iter().map(|&c| &candidates[c]).collect();
        let total_limit: Decimal = members.iter().map(|c| c.limit).sum();
        if total_limit == amount {
            let mut amounts: Vec<Decimal> = members.iter().map(|c| c.limit).collect();
            self.settle(&members, &mut amounts, amount)?;
            return Ok((amounts, None));
        }

        let lo = members.iter().map(|c| c.spot).min().unwrap_or_default();
        let hi = members.iter().map(|c| c.limit_price).max().unwrap_or_default();
        let mut bracket = Bracket::new(lo, -amount, hi, total_limit - amount);

        let allowed_residue = amount * self.tolerance * RESIDUE_FACTOR;
        let mut best_amounts: Vec<Decimal> = members.iter().map(|_| Decimal::ZERO).collect();
        let mut best_error = amount;
        let mut converged = false;

        for iteration in 1..=self.max_iterations {
            let price = bracket.next();
            let amounts = members
                .iter()
                .map(|c| self.amount_at_price(c, price))
                .collect::<Result<Vec<_>>>()?;
            let error = amounts.iter().copied().sum::<Decimal>() - amount;

            if error.abs() < best_error {
                best_error = error.abs();
                best_amounts = amounts;
            }

            if error.abs() <= allowed_residue || bracket.width() <= hi * INNER_PRECISION {
                debug!("Allocation converged after {} iterations at price {}", iteration, price);
                converged = true;
                break;
            }
            bracket.update(price, error);
        }

        self.settle(&members, &mut best_amounts, amount)?;

        let warning = if converged {
            None
        } else {
            Some(RouteWarning::ConvergenceNotReached {
                iterations: self.max_iterations,
                spread: self.spread(&members, &best_amounts)?,
            })
        };

        Ok((best_amounts, warning))
    }

    /// Truncate shares to token precision and hand out what is left
    fn settle(&self, members: &[&Candidate], amounts: &mut [Decimal], amount: Decimal) -> Result<()> {
        let scale = match self.swap_type {
            SwapType::ExactIn => members[0].path.token_in().decimals(),
            SwapType::ExactOut => members[0].path.token_out().decimals(),
        } as u32;
        for share in amounts.iter_mut() {
            *share = share.round_dp_with_strategy(scale, RoundingStrategy::ToZero);
        }
        self.place_residue(members, amounts, amount)
    }

    /// Give the unallocated remainder to the best marginal paths with room
    fn place_residue(&self, members: &[&Candidate], amounts: &mut [Decimal], amount: Decimal) -> Result<()> {
        let mut residue = amount - amounts.iter().copied().sum::<Decimal>();
        if residue.is_zero() {
            return Ok(());
        }

        let mut order: Vec<(usize, Decimal)> = members
            .iter()
            .zip(amounts.iter())
            .enumerate()
            .map(|(i, (c, &x))| Ok((i, c.path.marginal_price(self.swap_type, x)?)))
            .collect::<Result<Vec<_>>>()?;
        // Cheapest marginal price receives extra amount first, dearest gives it back first
        if residue > Decimal::ZERO {
            order.sort_by(|a, b| a.1.cmp(&b.1));
        } else {
            order.sort_by(|a, b| b.1.cmp(&a.1));
        }

        for (i, _) in order {
            if residue.is_zero() {
                break;
            }
            let step = if residue > Decimal::ZERO {
                residue.min(members[i].limit - amounts[i])
            } else {
                residue.max(-amounts[i])
            };
            amounts[i] += step;
            residue -= step;
        }

        Ok(())
    }

    /// Relative marginal-price spread among paths strictly inside their limits
    fn spread(&self, members: &[&Candidate], amounts: &[Decimal]) -> Result<Decimal> {
        let mut prices = Vec::new();
        for (c, &x) in members.iter().zip(amounts) {
            if x > Decimal::ZERO && x < c.limit {
                prices.push(c.path.marginal_price(self.swap_type, x)?);
            }
        }
        match (prices.iter().min(), prices.iter().max()) {
            (Some(&min), Some(&max)) if prices.len() > 1 && min > Decimal::ZERO => {
                Ok((max - min) / min)
            }
            _ => Ok(Decimal::ZERO),
        }
    }

    /// Amount that brings `candidate` to marginal price `price`
    fn amount_at_price(&self, candidate: &Candidate, price: Decimal) -> Result<Decimal> {
        if price <= candidate.spot {
            return Ok(Decimal::ZERO);
        }
        if price >= candidate.limit_price {
            return Ok(candidate.limit);
        }

        let mut bracket = Bracket::new(
            Decimal::ZERO,
            candidate.spot - price,
            candidate.limit,
            candidate.limit_price - price,
        );
        let precision = price * INNER_PRECISION;

        for _ in 0..INNER_MAX_ITERATIONS {
            let x = bracket.next();
            let gap = candidate.path.marginal_price(self.swap_type, x)? - price;
            if gap.abs() <= precision {
                return Ok(x);
            }
            bracket.update(x, gap);
            if bracket.width() <= candidate.limit * INNER_PRECISION {
                break;
            }
        }

        Ok(bracket.lo)
    }

    fn gross(&self, path: &Path, amount: Decimal) -> Result<Decimal> {
        Ok(match self.swap_type {
            SwapType::ExactIn => path.amount_out(amount)?,
            SwapType::ExactOut => path.amount_in(amount)?,
        })
    }

    fn net(&self, gross: Decimal, penalty: Decimal) -> Decimal {
        match self.swap_type {
            SwapType::ExactIn => gross - penalty,
            SwapType::ExactOut => gross + penalty,
        }
    }

    /// Higher is better for both swap types
    fn score(&self, net: Decimal) -> Decimal {
        match self.swap_type {
            SwapType::ExactIn => net,
            SwapType::ExactOut => -net,
        }
    }

    /// Strictly better; ties keep the earlier (smaller) set
    fn better(&self, candidate: &Evaluated, incumbent: &Evaluated) -> bool {
        self.score(candidate.net) > self.score(incumbent.net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathFinder;
    use crate::registry::{load_snapshot, PoolRecord, PoolSet, TokenRecord};
    use sor_amm::Address;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn weighted(id: &str, a: u8, b: u8, balance: Decimal) -> PoolRecord {
        PoolRecord {
            id: id.to_string(),
            pool_type: "Weighted".to_string(),
            swap_fee: dec!(0.003),
            amp: None,
            tokens: [a, b]
                .iter()
                .map(|&t| TokenRecord {
                    address: addr(t).to_string(),
                    balance,
                    decimals: 18,
                    weight: Some(dec!(0.5)),
                })
                .collect(),
        }
    }

    fn paths(records: &[PoolRecord]) -> Vec<Path> {
        let (set, _): (PoolSet, _) = load_snapshot(records);
        PathFinder::new(3, 64).find_paths(&set, &addr(1), &addr(2))
    }

    fn optimizer(swap_type: SwapType, cost: Decimal) -> AllocationOptimizer {
        AllocationOptimizer::new(&RouterConfig::default(), swap_type, cost)
    }

    #[test]
    fn test_bracket_finds_root() {
        // x^2 - 2 on [0, 2]
        let f = |x: Decimal| x * x - dec!(2);
        let mut bracket = Bracket::new(Decimal::ZERO, f(Decimal::ZERO), dec!(2), f(dec!(2)));
        let mut x = Decimal::ZERO;
        for _ in 0..60 {
            x = bracket.next();
            let fx = f(x);
            if fx.abs() < dec!(0.000000000001) {
                break;
            }
            bracket.update(x, fx);
        }
        assert!((x - dec!(1.41421356237)).abs() < dec!(0.00000001));
    }

    #[test]
    fn test_identical_pools_split_evenly() {
        let routes = paths(&[weighted("a", 1, 2, dec!(10000)), weighted("b", 1, 2, dec!(10000))]);
        let allocation = optimizer(SwapType::ExactIn, Decimal::ZERO)
            .optimize(routes, dec!(1000))
            .unwrap();

        assert_eq!(allocation.routes.len(), 2);
        let diff = (allocation.routes[0].amount - allocation.routes[1].amount).abs();
        assert!(diff < dec!(0.000001));
        let total: Decimal = allocation.routes.iter().map(|r| r.amount).sum();
        assert_eq!(total, dec!(1000));
        assert!(allocation.warnings.is_empty());
    }

    #[test]
    fn test_gas_keeps_single_path() {
        let routes = paths(&[weighted("a", 1, 2, dec!(10000)), weighted("b", 1, 2, dec!(10000))]);
        // Splitting 10 units saves far less than one extra swap costs
        let allocation = optimizer(SwapType::ExactIn, dec!(5))
            .optimize(routes, dec!(10))
            .unwrap();

        assert_eq!(allocation.routes.len(), 1);
        assert_eq!(allocation.gas_penalty, Decimal::ZERO);
    }

    #[test]
    fn test_exact_out_minimizes_input() {
        let routes = paths(&[weighted("a", 1, 2, dec!(10000)), weighted("b", 1, 2, dec!(2000))]);
        let split = optimizer(SwapType::ExactOut, Decimal::ZERO)
            .optimize(routes.clone(), dec!(500))
            .unwrap();

        let single = routes[0].amount_in(dec!(500)).unwrap();
        assert!(split.total_return < single);
        let total: Decimal = split.routes.iter().map(|r| r.amount).sum();
        assert_eq!(total, dec!(500));
    }

    #[test]
    fn test_insufficient_liquidity() {
        let routes = paths(&[weighted("a", 1, 2, dec!(100))]);
        let err = optimizer(SwapType::ExactIn, Decimal::ZERO)
            .optimize(routes, dec!(1000))
            .unwrap_err();
        assert!(matches!(err, RouterError::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_iteration_cap_reports_warning() {
        let routes = paths(&[weighted("a", 1, 2, dec!(10000)), weighted("b", 1, 2, dec!(3000))]);
        let config = RouterConfig {
            max_iterations: 1,
            ..RouterConfig::default()
        };
        let allocation = AllocationOptimizer::new(&config, SwapType::ExactIn, Decimal::ZERO)
            .optimize(routes, dec!(1500))
            .unwrap();

        // Best effort still splits and allocates the full amount
        assert_eq!(allocation.routes.len(), 2);
        let total: Decimal = allocation.routes.iter().map(|r| r.amount).sum();
        assert_eq!(total, dec!(1500));
        match allocation.warnings.as_slice() {
            [RouteWarning::ConvergenceNotReached { iterations, spread }] => {
                assert_eq!(*iterations, 1);
                assert!(*spread > Decimal::ZERO);
            }
            other => panic!("expected a convergence warning, got {:?}", other),
        }
    }
}
