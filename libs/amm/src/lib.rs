//! # SOR AMM Library - Pool Model and Pricing Engine
//!
//! ## Purpose
//!
//! Canonical in-memory model of the liquidity pools the router trades
//! through, plus the pure pricing functions over them. Weighted product pools
//! and StableSwap pools share one pricing contract ([`PoolPricing`]), so the
//! routing engine never branches on pool kind.
//!
//! ## Integration Points
//!
//! - **Input Sources**: Pool snapshots and on-chain refreshes via the router registry
//! - **Output Destinations**: Path finder, allocation optimizer, swap plan builder
//! - **Protocol Support**: Balancer-style weighted pools, Curve-style stable pools
//! - **Precision**: Human-unit `Decimal` pricing, raw `u128` amounts at token precision
//!
//! ## Architecture Role
//!
//! Leaf library with no I/O. Every operation is a pure function of a
//! [`PoolPairData`] view and a trade size, which keeps pricing testable in
//! isolation and safe to share across routing threads.
//!
//! ## Precision Profile
//!
//! - **Arithmetic**: 28-digit `Decimal`, no floating point
//! - **Fractional powers**: range-reduced series in [`decimal_math`]
//! - **Stable invariant**: Newton iteration to ~1e-22 relative

pub mod amount;
pub mod decimal_math;
pub mod error;
pub mod pool;
pub mod pool_traits;
pub mod stable_math;
pub mod token;
pub mod weighted_math;

pub use amount::{SwapAmount, SwapType};
pub use error::{AmmError, Result};
pub use pool::{PairCurve, Pool, PoolKind, PoolPairData, PoolToken};
pub use pool_traits::PoolPricing;
pub use stable_math::StableMath;
pub use token::{Address, Token};
pub use weighted_math::WeightedMath;

/// Common types for AMM calculations
pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;
