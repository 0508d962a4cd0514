//! # Smart Order Router - Split Routing Across AMM Pools
//!
//! ## Purpose
//!
//! Computes how to convert an amount of one token into another by splitting
//! the trade across pools and multi-hop paths, maximizing the amount
//! received (or minimizing the amount paid) net of the gas cost of every
//! extra pool. The result is a [`SwapPlan`]: ordered integer swaps plus the
//! token table a batch execution contract consumes.
//!
//! ## Integration Points
//!
//! - **Input Sources**: Indexer pool snapshots and on-chain balance refreshes
//!   via [`PoolRegistry`]
//! - **Price Oracles**: Native-currency prices through [`TokenPriceOracle`]
//!   for gas cost calibration
//! - **Output Destinations**: [`SwapPlan`] with batch limits for submission
//! - **Configuration**: [`sor_config::RouterConfig`] for hops, path caps and
//!   convergence settings
//!
//! ## Architecture Role
//!
//! ```text
//! Snapshot/Refresh → [PoolRegistry] → [PathFinder] → [AllocationOptimizer] → [build_plan]
//!                          ↓                ↓                 ↓                    ↓
//!                   Validated pools   Simple paths    Equal marginal price    Integer swaps
//!                   Token index       Shortest first  Gas-aware path count    Token table
//! ```
//!
//! ## Concurrency
//!
//! Routing is synchronous and reads one immutable [`PoolSet`] for its whole
//! run. Refreshes publish a new set by swapping an `Arc`, so concurrent
//! requests never see a half-applied update.

pub mod cost;
pub mod error;
pub mod loader;
pub mod optimizer;
pub mod paths;
pub mod plan;
pub mod registry;
pub mod router;

pub use cost::{
    calibrate, gas_penalty, Calibration, CostEstimator, FixedPriceOracle, TokenPriceOracle,
};
pub use error::{Result, RouteWarning, RouterError};
pub use loader::{load_refresh_file, load_snapshot_file, SnapshotFile};
pub use optimizer::{Allocation, AllocationOptimizer, Route};
pub use paths::{Path, PathFinder};
pub use plan::{build_plan, SwapPlan, SwapStep};
pub use registry::{
    apply_on_chain_refresh, load_snapshot, LiveBalances, PoolRecord, PoolRegistry, PoolSet,
    RefreshRecord, RejectedPool, TokenRecord,
};
pub use router::{RouteRequest, SmartOrderRouter};
