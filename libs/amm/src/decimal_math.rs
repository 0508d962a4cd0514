//! Transcendental helpers on `Decimal`
//!
//! Weighted pools need fractional powers. These keep the full 28-digit
//! precision across the exponent range weighted pools produce (weights from
//! 1% to 99%), using argument reduction before the series expansions.

use crate::error::{AmmError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// ln(2) to 28 decimal places
const LN_2: Decimal = dec!(0.6931471805599453094172321215);

/// Series terms below this no longer change a 28-digit result
const SERIES_EPSILON: Decimal = dec!(0.0000000000000000000000000001);

const MAX_SERIES_TERMS: u32 = 200;

/// Natural logarithm for positive values
pub fn ln(x: Decimal) -> Result<Decimal> {
    if x <= Decimal::ZERO {
        return Err(AmmError::math(format!("ln of non-positive value {}", x)));
    }
    if x == Decimal::ONE {
        return Ok(Decimal::ZERO);
    }

    // x = m * 2^k with m in [0.75, 1.5)
    let mut m = x;
    let mut k: i64 = 0;
    while m >= dec!(1.5) {
        m /= dec!(2);
        k += 1;
    }
    while m < dec!(0.75) {
        m *= dec!(2);
        k -= 1;
    }

    // ln(m) = 2 * atanh(z), z = (m - 1) / (m + 1), |z| <= 0.2
    let z = (m - Decimal::ONE) / (m + Decimal::ONE);
    let z_sq = z * z;
    let mut term = z;
    let mut sum = z;
    let mut n = 1u32;
    while term.abs() > SERIES_EPSILON {
        if n > MAX_SERIES_TERMS {
            return Err(AmmError::math(format!("ln({}) did not converge", x)));
        }
        term *= z_sq;
        n += 2;
        sum += term / Decimal::from(n);
    }

    Ok(dec!(2) * sum + LN_2 * Decimal::from(k))
}

/// Exponential function
pub fn exp(x: Decimal) -> Result<Decimal> {
    if x.is_zero() {
        return Ok(Decimal::ONE);
    }

    // exp(x) = exp(x / 2^k)^(2^k) with |x / 2^k| <= 0.5
    let mut reduced = x;
    let mut halvings = 0u32;
    while reduced.abs() > dec!(0.5) {
        reduced /= dec!(2);
        halvings += 1;
    }

    let mut term = Decimal::ONE;
    let mut sum = Decimal::ONE;
    let mut n = 0u32;
    while term.abs() > SERIES_EPSILON {
        if n > MAX_SERIES_TERMS {
            return Err(AmmError::math(format!("exp({}) did not converge", x)));
        }
        n += 1;
        term = term * reduced / Decimal::from(n);
        sum += term;
    }

    for _ in 0..halvings {
        sum = sum
            .checked_mul(sum)
            .ok_or_else(|| AmmError::math(format!("exp({}) overflowed", x)))?;
    }

    Ok(sum)
}

/// `base^exponent` for positive bases
pub fn pow(base: Decimal, exponent: Decimal) -> Result<Decimal> {
    if exponent.is_zero() || base == Decimal::ONE {
        return Ok(Decimal::ONE);
    }
    if exponent == Decimal::ONE {
        return Ok(base);
    }
    let log = ln(base)?;
    let product = log
        .checked_mul(exponent)
        .ok_or_else(|| AmmError::math(format!("{}^{} overflowed", base, exponent)))?;
    exp(product)
}
