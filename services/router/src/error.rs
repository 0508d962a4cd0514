//! Router errors and non-fatal warnings

use rust_decimal::Decimal;
use serde::Serialize;
use sor_amm::{Address, AmmError};
use thiserror::Error;

/// Terminal routing failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouterError {
    #[error("Invalid pool data for {pool_id}: {reason}")]
    InvalidPoolData { pool_id: String, reason: String },

    #[error("No route from {token_in} to {token_out} within {max_hops} hops")]
    NoRoute {
        token_in: Address,
        token_out: Address,
        max_hops: usize,
    },

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Cost calibration unavailable: {0}")]
    CalibrationUnavailable(String),

    #[error("Allocation did not converge after {iterations} iterations (spread {spread})")]
    ConvergenceNotReached { iterations: usize, spread: Decimal },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Amm(#[from] AmmError),
}

impl RouterError {
    pub(crate) fn invalid_pool(pool_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPoolData {
            pool_id: pool_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

/// Degradations recovered during routing, reported on the plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteWarning {
    /// Iteration cap hit; the best allocation found was used
    ConvergenceNotReached { iterations: usize, spread: Decimal },
    /// Gas penalty fell back to zero for the cost token
    CalibrationUnavailable { token: Address },
}

impl From<RouteWarning> for RouterError {
    fn from(warning: RouteWarning) -> Self {
        match warning {
            RouteWarning::ConvergenceNotReached { iterations, spread } => {
                RouterError::ConvergenceNotReached { iterations, spread }
            }
            RouteWarning::CalibrationUnavailable { token } => {
                RouterError::CalibrationUnavailable(format!("no price for {}", token))
            }
        }
    }
}
