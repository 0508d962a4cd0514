//! Routing engine parameters and defaults
//!
//! Every tunable the path finder, optimizer and cost estimator read lives
//! here, so a routing call is a pure function of its inputs plus this struct.

use anyhow::bail;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Default values, shared with callers that build partial configs
pub mod defaults {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Longest path considered
    pub const MAX_HOPS: usize = 4;

    /// Most paths a single plan may split across
    pub const MAX_POOLS: usize = 4;

    /// Candidate paths kept after enumeration
    pub const MAX_CANDIDATE_PATHS: usize = 64;

    /// Relative marginal-price spread at which allocation stops
    pub const CONVERGENCE_TOLERANCE: Decimal = dec!(0.000000001);

    /// Outer iterations of the allocation search
    pub const MAX_ITERATIONS: usize = 200;

    /// Empirical gas units one extra pool swap costs in a batch
    pub const GAS_UNITS_PER_SWAP: u64 = 100_000;

    /// Upper bound on a price-oracle lookup during calibration
    pub const CALIBRATION_TIMEOUT_MS: u64 = 2_000;

    /// Hard ceiling on `max_hops`; enumeration grows exponentially past it
    pub const HOP_CEILING: usize = 6;
}

/// Routing engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum hops per path, overridable per request
    pub max_hops: usize,
    /// Maximum number of paths one plan splits across
    pub max_pools: usize,
    /// Cap on enumerated candidate paths; shortest paths win
    pub max_candidate_paths: usize,
    /// Relative marginal-price spread considered converged
    pub convergence_tolerance: Decimal,
    /// Iteration cap before returning the best allocation found
    pub max_iterations: usize,
    /// Gas units charged per additional pool
    pub gas_units_per_swap: u64,
    /// Timeout for the one price lookup calibration performs
    pub calibration_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_hops: defaults::MAX_HOPS,
            max_pools: defaults::MAX_POOLS,
            max_candidate_paths: defaults::MAX_CANDIDATE_PATHS,
            convergence_tolerance: defaults::CONVERGENCE_TOLERANCE,
            max_iterations: defaults::MAX_ITERATIONS,
            gas_units_per_swap: defaults::GAS_UNITS_PER_SWAP,
            calibration_timeout_ms: defaults::CALIBRATION_TIMEOUT_MS,
        }
    }
}

impl RouterConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_hops == 0 || self.max_hops > defaults::HOP_CEILING {
            bail!(
                "max_hops must be between 1 and {}, got {}",
                defaults::HOP_CEILING,
                self.max_hops
            );
        }

        if self.max_pools == 0 {
            bail!("max_pools must be positive");
        }

        if self.max_candidate_paths == 0 {
            bail!("max_candidate_paths must be positive");
        }

        if self.convergence_tolerance <= Decimal::ZERO || self.convergence_tolerance >= dec!(1) {
            bail!(
                "convergence_tolerance must be in (0, 1), got {}",
                self.convergence_tolerance
            );
        }

        if self.max_iterations == 0 {
            bail!("max_iterations must be positive");
        }

        if self.calibration_timeout_ms == 0 {
            bail!("calibration_timeout_ms must be positive");
        }

        Ok(())
    }
}
