//! Pool model errors

use thiserror::Error;

/// Errors raised by pool construction and pricing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmmError {
    #[error("Insufficient liquidity in pool {pool_id}: {reason}")]
    InsufficientLiquidity { pool_id: String, reason: String },

    #[error("Invalid pool data for {pool_id}: {reason}")]
    InvalidPoolData { pool_id: String, reason: String },

    #[error("Token {token} is not part of pool {pool_id}")]
    TokenNotInPool { pool_id: String, token: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Math error: {0}")]
    MathError(String),
}

impl AmmError {
    pub(crate) fn insufficient(pool_id: &str, reason: impl Into<String>) -> Self {
        Self::InsufficientLiquidity {
            pool_id: pool_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(pool_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPoolData {
            pool_id: pool_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn math(reason: impl Into<String>) -> Self {
        Self::MathError(reason.into())
    }

    /// True when the error means the pool cannot absorb the requested size
    pub fn is_insufficient_liquidity(&self) -> bool {
        matches!(self, Self::InsufficientLiquidity { .. })
    }
}

pub type Result<T> = std::result::Result<T, AmmError>;
