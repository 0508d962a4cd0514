//! StableSwap invariant math for n-token pools
//!
//! The invariant `D` satisfies
//! `Ann * S + D = Ann * D + D^(n+1) / (n^n * ∏x)` with `S = Σx` and
//! `Ann = amp * n`. Swaps keep `D` fixed and solve for the one balance that
//! moves on the other side. All products are formed ratio-first so balances
//! in the 10^12 range stay inside `Decimal`'s 96-bit mantissa.

use crate::error::{AmmError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

/// Share of the output balance an exact-out trade may take
pub const MAX_OUT_RATIO: Decimal = dec!(0.99);

/// Newton iterations stop once a step moves less than this share of the value
const RELATIVE_PRECISION: Decimal = dec!(0.0000000000000000000001);

/// Absolute floor for the stopping rule, for values near zero
const ABSOLUTE_PRECISION: Decimal = dec!(0.00000000000000000000000001);

const MAX_NEWTON_ITERATIONS: usize = 255;

/// StableSwap math functions
pub struct StableMath;

impl StableMath {
    /// Solve the invariant `D` for the given balances
    pub fn invariant(amp: Decimal, balances: &[Decimal]) -> Result<Decimal> {
        check_balances(amp, balances)?;

        let n = Decimal::from(balances.len() as u64);
        let sum: Decimal = balances.iter().copied().sum();
        let ann = mul(amp, n)?;

        let mut d = sum;
        for _ in 0..MAX_NEWTON_ITERATIONS {
            // D_P = D^(n+1) / (n^n ∏x)
            let mut d_p = d;
            for balance in balances {
                d_p = mul(d_p, div(d, mul(*balance, n)?)?)?;
            }

            let numerator = add(mul(ann, sum)?, mul(n, d_p)?)?;
            let denominator = add(mul(ann - Decimal::ONE, d)?, mul(n + Decimal::ONE, d_p)?)?;
            let next = mul(d, div(numerator, denominator)?)?;

            if converged(next, d) {
                return Ok(next);
            }
            d = next;
        }

        warn!(amp = %amp, "Stable invariant did not converge after {} iterations", MAX_NEWTON_ITERATIONS);
        Err(AmmError::math(format!(
            "stable invariant did not converge for balances {:?}",
            balances
        )))
    }

    /// Balance of token `index` that keeps the invariant at `d` when every
    /// other balance is as given. The value at `index` itself is ignored.
    pub fn solve_balance(
        amp: Decimal,
        balances: &[Decimal],
        d: Decimal,
        index: usize,
    ) -> Result<Decimal> {
        if index >= balances.len() {
            return Err(AmmError::math(format!(
                "token index {} out of range for {} balances",
                index,
                balances.len()
            )));
        }

        let n = Decimal::from(balances.len() as u64);
        let ann = mul(amp, n)?;

        let mut c = d;
        let mut partial_sum = Decimal::ZERO;
        for (k, balance) in balances.iter().enumerate() {
            if k == index {
                continue;
            }
            if *balance <= Decimal::ZERO {
                return Err(AmmError::math("stable balances must be positive"));
            }
            partial_sum = add(partial_sum, *balance)?;
            c = mul(c, div(d, mul(*balance, n)?)?)?;
        }
        c = mul(c, div(d, mul(ann, n)?)?)?;
        let b = add(partial_sum, div(d, ann)?)?;

        // y = (y^2 + c) / (2y + b - D), divided through by y
        let mut y = d;
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let numerator = add(y, div(c, y)?)?;
            let denominator = dec!(2) + div(b - d, y)?;
            if denominator <= Decimal::ZERO {
                return Err(AmmError::math("stable balance solve left the curve"));
            }
            let next = div(numerator, denominator)?;

            if converged(next, y) {
                return Ok(next);
            }
            y = next;
        }

        warn!(amp = %amp, index, "Stable balance solve did not converge");
        Err(AmmError::math(format!(
            "stable balance solve did not converge for token {}",
            index
        )))
    }

    /// Output for an exact input, fee charged on the input
    pub fn calc_out_given_in(
        amp: Decimal,
        balances: &[Decimal],
        index_in: usize,
        index_out: usize,
        swap_fee: Decimal,
        amount_in: Decimal,
    ) -> Result<Decimal> {
        if amount_in.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let d = Self::invariant(amp, balances)?;

        let mut updated = balances.to_vec();
        updated[index_in] = add(updated[index_in], amount_in * (Decimal::ONE - swap_fee))?;
        let new_out = Self::solve_balance(amp, &updated, d, index_out)?;

        Ok((balances[index_out] - new_out).max(Decimal::ZERO))
    }

    /// Input required for an exact output, grossed up by the fee
    pub fn calc_in_given_out(
        amp: Decimal,
        balances: &[Decimal],
        index_in: usize,
        index_out: usize,
        swap_fee: Decimal,
        amount_out: Decimal,
    ) -> Result<Decimal> {
        if amount_out.is_zero() {
            return Ok(Decimal::ZERO);
        }
        if amount_out >= balances[index_out] {
            return Err(AmmError::math(format!(
                "output {} drains balance {}",
                amount_out, balances[index_out]
            )));
        }
        let d = Self::invariant(amp, balances)?;

        let mut updated = balances.to_vec();
        updated[index_out] -= amount_out;
        let new_in = Self::solve_balance(amp, &updated, d, index_in)?;

        Ok((new_in - balances[index_in]).max(Decimal::ZERO) / (Decimal::ONE - swap_fee))
    }

    /// Spot price at zero trade size, token-in per token-out
    ///
    /// Ratio of the invariant's partial derivatives
    /// `(Ann + D_P/x_out) / (Ann + D_P/x_in)`, grossed up by the fee.
    pub fn spot_price(
        amp: Decimal,
        balances: &[Decimal],
        index_in: usize,
        index_out: usize,
        swap_fee: Decimal,
    ) -> Result<Decimal> {
        let d = Self::invariant(amp, balances)?;
        price_at(amp, balances, d, index_in, index_out, swap_fee)
    }

    /// Marginal price once `amount_in` has been swapped in
    pub fn marginal_price_after_exact_in(
        amp: Decimal,
        balances: &[Decimal],
        index_in: usize,
        index_out: usize,
        swap_fee: Decimal,
        amount_in: Decimal,
    ) -> Result<Decimal> {
        let d = Self::invariant(amp, balances)?;
        if amount_in.is_zero() {
            return price_at(amp, balances, d, index_in, index_out, swap_fee);
        }

        let mut updated = balances.to_vec();
        updated[index_in] = add(updated[index_in], amount_in * (Decimal::ONE - swap_fee))?;
        updated[index_out] = Self::solve_balance(amp, &updated, d, index_out)?;

        price_at(amp, &updated, d, index_in, index_out, swap_fee)
    }

    /// Marginal price once `amount_out` has been taken out
    pub fn marginal_price_after_exact_out(
        amp: Decimal,
        balances: &[Decimal],
        index_in: usize,
        index_out: usize,
        swap_fee: Decimal,
        amount_out: Decimal,
    ) -> Result<Decimal> {
        let d = Self::invariant(amp, balances)?;
        if amount_out.is_zero() {
            return price_at(amp, balances, d, index_in, index_out, swap_fee);
        }
        if amount_out >= balances[index_out] {
            return Err(AmmError::math(format!(
                "output {} drains balance {}",
                amount_out, balances[index_out]
            )));
        }

        let mut updated = balances.to_vec();
        updated[index_out] -= amount_out;
        updated[index_in] = Self::solve_balance(amp, &updated, d, index_in)?;

        price_at(amp, &updated, d, index_in, index_out, swap_fee)
    }
}

fn price_at(
    amp: Decimal,
    balances: &[Decimal],
    d: Decimal,
    index_in: usize,
    index_out: usize,
    swap_fee: Decimal,
) -> Result<Decimal> {
    let n = Decimal::from(balances.len() as u64);
    let ann = mul(amp, n)?;

    let mut d_p = d;
    for balance in balances {
        d_p = mul(d_p, div(d, mul(*balance, n)?)?)?;
    }

    let partial_out = add(ann, div(d_p, balances[index_out])?)?;
    let partial_in = add(ann, div(d_p, balances[index_in])?)?;

    div(partial_out, mul(partial_in, Decimal::ONE - swap_fee)?)
}

fn check_balances(amp: Decimal, balances: &[Decimal]) -> Result<()> {
    if amp <= Decimal::ZERO {
        return Err(AmmError::math("amplification must be positive"));
    }
    if balances.len() < 2 {
        return Err(AmmError::math("stable math needs at least 2 balances"));
    }
    if balances.iter().any(|b| *b <= Decimal::ZERO) {
        return Err(AmmError::math("stable balances must be positive"));
    }
    Ok(())
}

fn converged(next: Decimal, previous: Decimal) -> bool {
    let step = (next - previous).abs();
    step <= ABSOLUTE_PRECISION || step <= next.abs() * RELATIVE_PRECISION
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| AmmError::math(format!("{} + {} overflowed", a, b)))
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| AmmError::math(format!("{} * {} overflowed", a, b)))
}

fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_div(b)
        .ok_or_else(|| AmmError::math(format!("{} / {} is undefined", a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMP: Decimal = dec!(200);

    fn close(a: Decimal, b: Decimal, rel: Decimal) -> bool {
        ((a - b) / b).abs() <= rel
    }

    #[test]
    fn test_balanced_invariant_is_sum() {
        let balances = [dec!(1000), dec!(1000), dec!(1000)];
        let d = StableMath::invariant(AMP, &balances).unwrap();
        assert!(close(d, dec!(3000), dec!(0.0000000001)));
    }

    #[test]
    fn test_solve_balance_recovers_original() {
        let balances = [dec!(1200), dec!(800), dec!(950)];
        let d = StableMath::invariant(AMP, &balances).unwrap();

        let solved = StableMath::solve_balance(AMP, &balances, d, 1).unwrap();
        assert!(close(solved, dec!(800), dec!(0.000000000001)));
    }

    #[test]
    fn test_swap_near_parity_for_high_amp() {
        let balances = [dec!(100000), dec!(100000)];
        let out =
            StableMath::calc_out_given_in(AMP, &balances, 0, 1, Decimal::ZERO, dec!(100)).unwrap();

        // Deep balanced pool with a flat curve: close to 1:1 but never above
        assert!(out < dec!(100));
        assert!(out > dec!(99.99));
    }

    #[test]
    fn test_swap_preserves_invariant() {
        let balances = [dec!(5000), dec!(3000)];
        let amount_in = dec!(400);
        let out =
            StableMath::calc_out_given_in(AMP, &balances, 0, 1, Decimal::ZERO, amount_in).unwrap();

        let before = StableMath::invariant(AMP, &balances).unwrap();
        let after =
            StableMath::invariant(AMP, &[balances[0] + amount_in, balances[1] - out]).unwrap();
        assert!(close(after, before, dec!(0.000000000001)));
    }

    #[test]
    fn test_in_given_out_inverts_out_given_in() {
        let balances = [dec!(2000), dec!(1500), dec!(2500)];
        let fee = dec!(0.0004);

        let out = StableMath::calc_out_given_in(AMP, &balances, 2, 0, fee, dec!(321)).unwrap();
        let back = StableMath::calc_in_given_out(AMP, &balances, 2, 0, fee, out).unwrap();
        assert!(close(back, dec!(321), dec!(0.000000001)));
    }

    #[test]
    fn test_balanced_spot_price_is_fee_grossed_parity() {
        let fee = dec!(0.001);
        let spot = StableMath::spot_price(AMP, &[dec!(700), dec!(700)], 0, 1, fee).unwrap();
        assert!(close(spot, Decimal::ONE / (Decimal::ONE - fee), dec!(0.000000001)));
    }

    #[test]
    fn test_marginal_price_matches_finite_difference() {
        let balances = [dec!(1000), dec!(400)];
        let fee = dec!(0.0004);
        let h = dec!(0.001);

        let a = dec!(150);
        let lo = StableMath::calc_out_given_in(AMP, &balances, 0, 1, fee, a - h).unwrap();
        let hi = StableMath::calc_out_given_in(AMP, &balances, 0, 1, fee, a + h).unwrap();
        let numeric = (dec!(2) * h) / (hi - lo);
        let analytic =
            StableMath::marginal_price_after_exact_in(AMP, &balances, 0, 1, fee, a).unwrap();
        assert!(close(analytic, numeric, dec!(0.000001)));

        let b = dec!(120);
        let lo = StableMath::calc_in_given_out(AMP, &balances, 0, 1, fee, b - h).unwrap();
        let hi = StableMath::calc_in_given_out(AMP, &balances, 0, 1, fee, b + h).unwrap();
        let numeric = (hi - lo) / (dec!(2) * h);
        let analytic =
            StableMath::marginal_price_after_exact_out(AMP, &balances, 0, 1, fee, b).unwrap();
        assert!(close(analytic, numeric, dec!(0.000001)));
    }

    #[test]
    fn test_zero_balance_rejected() {
        assert!(StableMath::invariant(AMP, &[dec!(100), Decimal::ZERO]).is_err());
    }
}
