//! Path enumeration and path-level pricing
//!
//! A [`Path`] chains pool views so the output token of each hop is the input
//! token of the next. Path pricing composes the per-hop curves: amounts flow
//! through hop by hop and marginal prices multiply (chain rule).

use crate::registry::PoolSet;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sor_amm::{Address, AmmError, Pool, PoolPairData, PoolPricing, SwapAmount, SwapType, Token};
use std::collections::HashMap;
use tracing::debug;

/// Smallest relative back-off when a limit fails to clear every hop
const LIMIT_SHRINK: Decimal = dec!(0.000000001);

/// Back-off doubles on every attempt
const LIMIT_SHRINK_ATTEMPTS: usize = 8;

/// Ordered chain of pool hops from one token to another
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    hops: Vec<PoolPairData>,
    tokens: Vec<Token>,
}

impl Path {
    /// Build a path from connected hops
    pub fn from_hops(hops: Vec<PoolPairData>) -> sor_amm::Result<Self> {
        let first = hops
            .first()
            .ok_or_else(|| AmmError::MathError("path needs at least one hop".to_string()))?;

        let mut tokens = Vec::with_capacity(hops.len() + 1);
        tokens.push(first.token_in);
        for hop in &hops {
            let last = tokens[tokens.len() - 1];
            if hop.token_in != last {
                return Err(AmmError::InvalidPoolData {
                    pool_id: hop.pool_id.clone(),
                    reason: format!("hop starts at {} but path is at {}", hop.token_in, last),
                });
            }
            tokens.push(hop.token_out);
        }

        Ok(Self { hops, tokens })
    }

    pub fn hops(&self) -> &[PoolPairData] {
        &self.hops
    }

    /// Tokens in hop order, including both endpoints
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn token_in(&self) -> Token {
        self.tokens[0]
    }

    pub fn token_out(&self) -> Token {
        self.tokens[self.tokens.len() - 1]
    }

    pub fn pool_ids(&self) -> impl Iterator<Item = &str> {
        self.hops.iter().map(|h| h.pool_id.as_str())
    }

    pub fn shares_pool_with(&self, other: &Path) -> bool {
        self.pool_ids().any(|id| other.pool_ids().any(|o| o == id))
    }

    /// Output of the whole path for an exact input
    pub fn amount_out(&self, amount_in: Decimal) -> sor_amm::Result<Decimal> {
        self.amount_out_through(self.hops.len(), amount_in)
    }

    /// Input the whole path needs for an exact output
    pub fn amount_in(&self, amount_out: Decimal) -> sor_amm::Result<Decimal> {
        self.amount_in_through(0, amount_out)
    }

    /// Forward through the first `hop_count` hops
    fn amount_out_through(&self, hop_count: usize, amount_in: Decimal) -> sor_amm::Result<Decimal> {
        self.hops[..hop_count]
            .iter()
            .try_fold(amount_in, |amount, hop| hop.amount_out(amount))
    }

    /// Backward through the hops from index `start` to the end
    fn amount_in_through(&self, start: usize, amount_out: Decimal) -> sor_amm::Result<Decimal> {
        self.hops[start..]
            .iter()
            .rev()
            .try_fold(amount_out, |amount, hop| hop.amount_in(amount))
    }

    /// Product of hop spot prices, token in per token out
    pub fn spot_price(&self) -> sor_amm::Result<Decimal> {
        self.hops.iter().try_fold(Decimal::ONE, |price, hop| {
            checked_price_mul(price, hop.spot_price()?)
        })
    }

    /// Marginal price of the path once `amount` has traded
    ///
    /// `amount` is the path input for exact-in and the path output for
    /// exact-out. The result is token in per token out.
    pub fn marginal_price(&self, swap_type: SwapType, amount: Decimal) -> sor_amm::Result<Decimal> {
        let mut price = Decimal::ONE;
        match swap_type {
            SwapType::ExactIn => {
                let mut hop_in = amount;
                for hop in &self.hops {
                    price = checked_price_mul(price, hop.marginal_price_after_swap(swap_type, hop_in)?)?;
                    hop_in = hop.amount_out(hop_in)?;
                }
            }
            SwapType::ExactOut => {
                let mut hop_out = amount;
                for hop in self.hops.iter().rev() {
                    price = checked_price_mul(price, hop.marginal_price_after_swap(swap_type, hop_out)?)?;
                    hop_out = hop.amount_in(hop_out)?;
                }
            }
        }
        Ok(price)
    }

    /// Output of an integer plan for an exact input: every hop output is
    /// rounded down to its token precision
    pub fn settled_amount_out(&self, amount_in: Decimal) -> sor_amm::Result<Decimal> {
        let start = SwapAmount::from_decimal(self.token_in(), amount_in)?.to_decimal()?;
        self.hops.iter().try_fold(start, |amount, hop| {
            SwapAmount::from_decimal(hop.token_out, hop.amount_out(amount)?)?.to_decimal()
        })
    }

    /// Input of an integer plan for an exact output: every hop input is
    /// rounded up to its token precision
    pub fn settled_amount_in(&self, amount_out: Decimal) -> sor_amm::Result<Decimal> {
        let start = SwapAmount::from_decimal_round_up(self.token_out(), amount_out)?.to_decimal()?;
        self.hops.iter().rev().try_fold(start, |amount, hop| {
            SwapAmount::from_decimal_round_up(hop.token_in, hop.amount_in(amount)?)?.to_decimal()
        })
    }

    /// Largest path input (exact-in) or output (exact-out) every hop accepts
    ///
    /// The limit sits at the precision of the fixed token and still clears
    /// every hop once intermediate amounts are rounded as an integer plan
    /// rounds them.
    pub fn limit_amount(&self, swap_type: SwapType) -> sor_amm::Result<Decimal> {
        let (exact, fixed) = match swap_type {
            SwapType::ExactIn => (self.exact_in_limit()?, self.token_in()),
            SwapType::ExactOut => (self.exact_out_limit()?, self.token_out()),
        };
        let scale = fixed.decimals() as u32;
        let limit = exact.round_dp_with_strategy(scale, RoundingStrategy::ToZero);
        if limit <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let mut candidate = limit;
        let mut backoff = (limit * LIMIT_SHRINK)
            .max(self.rounding_margin(swap_type))
            .max(fixed.smallest_amount());
        for _ in 0..LIMIT_SHRINK_ATTEMPTS {
            if self.clears(swap_type, candidate) {
                return Ok(candidate);
            }
            candidate = (candidate - backoff).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
            if candidate <= Decimal::ZERO {
                break;
            }
            backoff *= dec!(2);
        }

        debug!("Path limit {} does not clear all hops, treating path as empty", limit);
        Ok(Decimal::ZERO)
    }

    fn clears(&self, swap_type: SwapType, amount: Decimal) -> bool {
        match swap_type {
            SwapType::ExactIn => self.settled_amount_out(amount).is_ok(),
            SwapType::ExactOut => self.settled_amount_in(amount).is_ok(),
        }
    }

    /// Path output worth one raw unit of each intermediate token
    ///
    /// Rounding an exact-out plan up adds at most that much to what the
    /// upstream hops must deliver. Rounding an exact-in plan down only
    /// shrinks downstream amounts, so it needs no margin.
    fn rounding_margin(&self, swap_type: SwapType) -> Decimal {
        if swap_type == SwapType::ExactIn {
            return Decimal::ZERO;
        }
        let mut margin = Decimal::ZERO;
        for (i, token) in self.tokens.iter().enumerate().take(self.hops.len()).skip(1) {
            // Dust a curve cannot price leaves the doubling back-off to cover it
            if let Ok(unit) = self.hops[i..]
                .iter()
                .try_fold(token.smallest_amount(), |amount, hop| hop.amount_out(amount))
            {
                margin += unit;
            }
        }
        margin
    }

    fn exact_in_limit(&self) -> sor_amm::Result<Decimal> {
        let mut limit = self.hops[0].limit_amount(SwapType::ExactIn)?;
        for (i, hop) in self.hops.iter().enumerate().skip(1) {
            if limit.is_zero() {
                break;
            }
            let hop_limit = hop.limit_amount(SwapType::ExactIn)?;
            let reaching = self.amount_out_through(i, limit)?;
            if reaching > hop_limit {
                limit = self.hops[..i]
                    .iter()
                    .rev()
                    .try_fold(hop_limit, |amount, prev| prev.amount_in(amount))?;
            }
        }
        Ok(limit)
    }

    fn exact_out_limit(&self) -> sor_amm::Result<Decimal> {
        let last = self.hops.len() - 1;
        let mut limit = self.hops[last].limit_amount(SwapType::ExactOut)?;
        for i in (0..last).rev() {
            if limit.is_zero() {
                break;
            }
            let hop_limit = self.hops[i].limit_amount(SwapType::ExactOut)?;
            let required = self.amount_in_through(i + 1, limit)?;
            if required > hop_limit {
                limit = self.hops[i + 1..]
                    .iter()
                    .try_fold(hop_limit, |amount, next| next.amount_out(amount))?;
            }
        }
        Ok(limit)
    }
}

fn checked_price_mul(a: Decimal, b: Decimal) -> sor_amm::Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| AmmError::MathError(format!("path price overflow: {} * {}", a, b)))
}

/// Partial path during enumeration
struct Partial<'a> {
    pools: Vec<&'a Pool>,
    tokens: Vec<Address>,
}

/// Bounded breadth-first path enumeration
#[derive(Debug, Clone, Copy)]
pub struct PathFinder {
    max_hops: usize,
    max_candidates: usize,
}

impl PathFinder {
    pub fn new(max_hops: usize, max_candidates: usize) -> Self {
        Self {
            max_hops,
            max_candidates,
        }
    }

    /// Simple paths from `token_in` to `token_out`, shortest first
    ///
    /// No path repeats a pool or revisits a token. Pools over the same token
    /// pair are separate candidates. Enumeration stops at the candidate cap,
    /// which therefore keeps the shortest paths.
    pub fn find_paths(&self, pools: &PoolSet, token_in: &Address, token_out: &Address) -> Vec<Path> {
        let mut found = Vec::new();
        if token_in == token_out || self.max_hops == 0 || self.max_candidates == 0 {
            return found;
        }

        let to_out: HashMap<Address, usize> = pools.distances_from(token_out);
        if !to_out.contains_key(token_in) {
            debug!("No connection from {} to {}", token_in, token_out);
            return found;
        }

        let mut frontier = vec![Partial {
            pools: Vec::new(),
            tokens: vec![*token_in],
        }];

        for level in 1..=self.max_hops {
            let mut next = Vec::new();

            for partial in &frontier {
                let current = partial.tokens[partial.tokens.len() - 1];

                for pool in pools.pools_with_token(&current) {
                    if partial.pools.iter().any(|p| p.id() == pool.id()) {
                        continue;
                    }

                    for pool_token in pool.tokens() {
                        let token = pool_token.token.address;
                        if token == current || partial.tokens.contains(&token) {
                            continue;
                        }

                        let mut hop_pools = partial.pools.clone();
                        hop_pools.push(pool);
                        let mut hop_tokens = partial.tokens.clone();
                        hop_tokens.push(token);

                        if token == *token_out {
                            if let Some(path) = build_path(&hop_pools, &hop_tokens) {
                                found.push(path);
                                if found.len() >= self.max_candidates {
                                    debug!(
                                        "Candidate cap {} reached at {} hops",
                                        self.max_candidates, level
                                    );
                                    return found;
                                }
                            }
                        } else if to_out
                            .get(&token)
                            .map_or(false, |&d| level + d <= self.max_hops)
                        {
                            next.push(Partial {
                                pools: hop_pools,
                                tokens: hop_tokens,
                            });
                        }
                    }
                }
            }

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        debug!(
            "Found {} paths from {} to {} within {} hops",
            found.len(),
            token_in,
            token_out,
            self.max_hops
        );
        found
    }
}

fn build_path(pools: &[&Pool], tokens: &[Address]) -> Option<Path> {
    let hops: sor_amm::Result<Vec<PoolPairData>> = pools
        .iter()
        .zip(tokens.windows(2))
        .map(|(pool, pair)| PoolPairData::new(pool, &pair[0], &pair[1]))
        .collect();

    match hops.and_then(Path::from_hops) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("Dropping path: {}", e);
            None
        }
    }
}
