//! Pool Registry
//!
//! Builds the working [`PoolSet`] from indexer snapshots and on-chain
//! refreshes. A pool set is never mutated after construction: a refresh
//! produces a new set, and [`PoolRegistry`] swaps the shared reference so
//! in-flight routes keep the view they started with.

use crate::error::{Result, RouterError};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sor_amm::{Address, AmmError, Pool, PoolKind, PoolToken, Token};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One pool as the indexer reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRecord {
    pub id: String,
    pub pool_type: String,
    pub swap_fee: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amp: Option<Decimal>,
    pub tokens: Vec<TokenRecord>,
}

/// One token entry of a [`PoolRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub address: String,
    pub balance: Decimal,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Decimal>,
}

/// Live state for one pool, in the pool's token order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub balances: Vec<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<Decimal>>,
}

/// Refreshed state keyed by pool id
pub type LiveBalances = HashMap<String, RefreshRecord>;

/// A snapshot pool that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPool {
    pub pool_id: String,
    pub error: RouterError,
}

/// Immutable set of validated pools with token indexes
#[derive(Debug, Clone, Default)]
pub struct PoolSet {
    pools: Vec<Arc<Pool>>,
    by_id: HashMap<String, usize>,
    by_token: HashMap<Address, Vec<usize>>,
    tokens: HashMap<Address, Token>,
    /// Live balances have been applied on top of the snapshot
    on_chain: bool,
}

impl PoolSet {
    /// Index already validated pools; ids are assumed unique
    fn from_pools(pools: Vec<Arc<Pool>>, on_chain: bool) -> Self {
        let mut by_id = HashMap::with_capacity(pools.len());
        let mut by_token: HashMap<Address, Vec<usize>> = HashMap::new();
        let mut tokens = HashMap::new();

        for (index, pool) in pools.iter().enumerate() {
            by_id.insert(pool.id().to_string(), index);
            for pool_token in pool.tokens() {
                by_token
                    .entry(pool_token.token.address)
                    .or_default()
                    .push(index);
                tokens
                    .entry(pool_token.token.address)
                    .or_insert(pool_token.token);
            }
        }

        Self {
            pools,
            by_id,
            by_token,
            tokens,
            on_chain,
        }
    }

    /// True when this set carries refreshed on-chain balances
    pub fn finished_fetching_on_chain(&self) -> bool {
        self.on_chain
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Pools in snapshot order
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.iter().map(|p| p.as_ref())
    }

    pub fn get(&self, pool_id: &str) -> Option<&Pool> {
        self.by_id.get(pool_id).map(|&i| self.pools[i].as_ref())
    }

    /// Token with its registered precision
    pub fn token(&self, address: &Address) -> Option<Token> {
        self.tokens.get(address).copied()
    }

    /// Pools holding `address`, in snapshot order
    pub fn pools_with_token<'a>(&'a self, address: &Address) -> impl Iterator<Item = &'a Pool> + 'a {
        self.by_token
            .get(address)
            .into_iter()
            .flatten()
            .map(move |&i| self.pools[i].as_ref())
    }

    /// Hop distance from `start` to every reachable token
    pub fn distances_from(&self, start: &Address) -> HashMap<Address, usize> {
        let mut distances = HashMap::new();
        if !self.tokens.contains_key(start) {
            return distances;
        }

        let mut queue = VecDeque::new();
        distances.insert(*start, 0);
        queue.push_back(*start);

        while let Some(token) = queue.pop_front() {
            let next = distances[&token] + 1;
            for pool in self.pools_with_token(&token) {
                for pool_token in pool.tokens() {
                    let neighbour = pool_token.token.address;
                    if !distances.contains_key(&neighbour) {
                        distances.insert(neighbour, next);
                        queue.push_back(neighbour);
                    }
                }
            }
        }

        distances
    }

    /// Keep only pools that lie on some `token_in -> token_out` connection of
    /// at most `max_hops` hops
    pub fn filter_for_pair(&self, token_in: &Address, token_out: &Address, max_hops: usize) -> PoolSet {
        let from_in = self.distances_from(token_in);
        let to_out = self.distances_from(token_out);

        let kept: Vec<Arc<Pool>> = self
            .pools
            .iter()
            .filter(|pool| {
                let tokens = pool.tokens();
                tokens.iter().any(|a| {
                    tokens.iter().any(|b| {
                        a.token.address != b.token.address
                            && match (from_in.get(&a.token.address), to_out.get(&b.token.address)) {
                                (Some(da), Some(db)) => da + 1 + db <= max_hops,
                                _ => false,
                            }
                    })
                })
            })
            .cloned()
            .collect();

        debug!(
            "Filtered {} of {} pools for {} -> {} within {} hops",
            kept.len(),
            self.pools.len(),
            token_in,
            token_out,
            max_hops
        );

        PoolSet::from_pools(kept, self.on_chain)
    }
}

fn parse_pool_kind(tag: &str) -> Option<PoolKind> {
    match tag.to_ascii_lowercase().as_str() {
        "weighted" => Some(PoolKind::Weighted),
        "stable" => Some(PoolKind::Stable),
        _ => None,
    }
}

fn pool_error(pool_id: &str, error: AmmError) -> RouterError {
    match error {
        AmmError::InvalidPoolData { pool_id, reason } => RouterError::InvalidPoolData { pool_id, reason },
        other => RouterError::invalid_pool(pool_id, other.to_string()),
    }
}

fn build_pool(record: &PoolRecord, known_tokens: &HashMap<Address, Token>) -> Result<Pool> {
    let kind = parse_pool_kind(&record.pool_type).ok_or_else(|| {
        RouterError::invalid_pool(&record.id, format!("unknown pool type '{}'", record.pool_type))
    })?;

    let mut tokens = Vec::with_capacity(record.tokens.len());
    for token_record in &record.tokens {
        let address: Address = token_record
            .address
            .parse()
            .map_err(|e| pool_error(&record.id, e))?;
        let token =
            Token::new(address, token_record.decimals).map_err(|e| pool_error(&record.id, e))?;

        if let Some(known) = known_tokens.get(&address) {
            if known.decimals() != token.decimals() {
                return Err(RouterError::invalid_pool(
                    &record.id,
                    format!(
                        "token {} reported with {} decimals, previously {}",
                        address,
                        token.decimals(),
                        known.decimals()
                    ),
                ));
            }
        }

        tokens.push(PoolToken {
            token,
            balance: token_record.balance,
            weight: token_record.weight,
        });
    }

    Pool::new(record.id.clone(), kind, record.swap_fee, record.amp, tokens)
        .map_err(|e| pool_error(&record.id, e))
}

/// Validate snapshot records into a pool set
///
/// Malformed pools are skipped and logged, never fatal. The second value
/// lists every rejection in record order.
pub fn load_snapshot(records: &[PoolRecord]) -> (PoolSet, Vec<RejectedPool>) {
    let mut pools = Vec::with_capacity(records.len());
    let mut known_tokens: HashMap<Address, Token> = HashMap::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut rejected = Vec::new();

    for record in records {
        let built = if seen_ids.contains(record.id.as_str()) {
            Err(RouterError::invalid_pool(&record.id, "duplicate pool id"))
        } else {
            build_pool(record, &known_tokens)
        };

        match built {
            Ok(pool) => {
                for pool_token in pool.tokens() {
                    known_tokens
                        .entry(pool_token.token.address)
                        .or_insert(pool_token.token);
                }
                seen_ids.insert(record.id.as_str());
                pools.push(Arc::new(pool));
            }
            Err(error) => {
                warn!("Skipping pool {}: {}", record.id, error);
                rejected.push(RejectedPool {
                    pool_id: record.id.clone(),
                    error,
                });
            }
        }
    }

    info!(
        "Loaded {} pools from snapshot ({} rejected, {} tokens)",
        pools.len(),
        rejected.len(),
        known_tokens.len()
    );

    (PoolSet::from_pools(pools, false), rejected)
}

/// Overlay live balances on a pool set
///
/// Pools absent from `live` keep their values. A refresh that fails
/// validation is logged and the pool keeps its previous values.
pub fn apply_on_chain_refresh(pool_set: &PoolSet, live: &LiveBalances) -> PoolSet {
    let mut refreshed = 0usize;

    let pools = pool_set
        .pools
        .iter()
        .map(|pool| match live.get(pool.id()) {
            Some(update) => match pool.with_balances(&update.balances, update.weights.as_deref()) {
                Ok(next) => {
                    refreshed += 1;
                    Arc::new(next)
                }
                Err(e) => {
                    warn!("Keeping snapshot state for pool {}: {}", pool.id(), e);
                    Arc::clone(pool)
                }
            },
            None => Arc::clone(pool),
        })
        .collect();

    for id in live.keys().filter(|id| !pool_set.by_id.contains_key(id.as_str())) {
        debug!("Ignoring refresh for unknown pool {}", id);
    }

    info!("Applied on-chain refresh to {} of {} pools", refreshed, pool_set.len());

    PoolSet::from_pools(pools, true)
}

/// Shared holder of the current pool set
///
/// Readers take an `Arc` and route against it without holding any lock.
/// Writers replace the whole set at once, refresh flag included.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    current: RwLock<Arc<PoolSet>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pool set with its refresh flag
    pub fn snapshot(&self) -> Arc<PoolSet> {
        Arc::clone(&self.current.read())
    }

    /// Replace the pool set with a fresh snapshot, clearing the refresh flag
    pub fn load_snapshot(&self, records: &[PoolRecord]) -> Vec<RejectedPool> {
        let (pool_set, rejected) = load_snapshot(records);
        *self.current.write() = Arc::new(pool_set);
        rejected
    }

    /// Overlay live balances on the current set and publish the result
    pub fn apply_on_chain_refresh(&self, live: &LiveBalances) {
        // Upgradable read serializes writers while readers keep going
        let guard = self.current.upgradable_read();
        let next = Arc::new(apply_on_chain_refresh(&guard, live));
        let mut current = RwLockUpgradableReadGuard::upgrade(guard);
        *current = next;
    }

    /// True once live balances have been applied to the current snapshot
    pub fn finished_fetching_on_chain(&self) -> bool {
        self.current.read().finished_fetching_on_chain()
    }
}
