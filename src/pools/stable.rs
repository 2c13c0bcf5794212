//! StableSwap pools, with optional per-token price rates (MetaStable).
//!
//! Balances and amounts are multiplied by each token's rate before entering
//! the invariant, and divided back out on the way out.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use tracing::trace;

use crate::error::{Error, Result};
use crate::fixed_point::{self, div_down, div_up, div_up_int, mul_down, pow10, ONE};
use crate::token::PoolToken;

use super::{add_fee, subtract_fee_rounding_up, SwapContext, SwapKind, SwapMath};

/// Precision of the amplification parameter.
pub const AMP_PRECISION: u32 = 1_000;
const MAX_ITERATIONS: usize = 255;
static ALMOST_ONE: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(99u8) * pow10(16));

/// Parameters of a stable pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StableMath {
    /// Amplification factor times [`AMP_PRECISION`].
    pub amp: BigInt,
}

fn within_one(a: &BigInt, b: &BigInt) -> bool {
    (a - b).abs() <= BigInt::one()
}

/// Solves the StableSwap invariant `D` by Newton iteration.
pub fn calculate_invariant(amp: &BigInt, balances: &[BigInt]) -> Result<BigInt> {
    let sum: BigInt = balances.iter().sum();
    if sum.is_zero() {
        return Ok(sum);
    }
    let n = BigInt::from(balances.len());
    let amp_precision = BigInt::from(AMP_PRECISION);
    let amp_times_total = amp * &n;

    let mut invariant = sum.clone();
    for iteration in 0..MAX_ITERATIONS {
        let mut d_p = invariant.clone();
        for balance in balances {
            d_p = fixed_point::div_down_int(&(d_p * &invariant), &(balance * &n))?;
        }
        let previous = invariant.clone();
        let numerator = ((&amp_times_total * &sum) / &amp_precision + &d_p * &n) * &invariant;
        let denominator = ((&amp_times_total - &amp_precision) * &invariant) / &amp_precision + (&n + 1u8) * &d_p;
        invariant = fixed_point::div_down_int(&numerator, &denominator)?;
        trace!(iteration, %invariant, "stable invariant step");
        if within_one(&invariant, &previous) {
            return Ok(invariant);
        }
    }
    Err(Error::convergence("stable invariant", MAX_ITERATIONS))
}

/// Solves for `balances[token_index]` that keeps the invariant, all other
/// balances fixed.
pub fn token_balance_given_invariant(
    amp: &BigInt,
    balances: &[BigInt],
    invariant: &BigInt,
    token_index: usize,
) -> Result<BigInt> {
    let n = BigInt::from(balances.len());
    let amp_precision = BigInt::from(AMP_PRECISION);
    let amp_times_total = amp * &n;

    let mut sum = balances[0].clone();
    let mut p_d = &balances[0] * &n;
    for balance in &balances[1..] {
        p_d = fixed_point::div_down_int(&(p_d * balance * &n), invariant)?;
        sum += balance;
    }
    sum -= &balances[token_index];

    let inv2 = invariant * invariant;
    let c = div_up_int(&inv2, &(&amp_times_total * &p_d))? * &amp_precision * &balances[token_index];
    let b = sum + fixed_point::div_down_int(invariant, &amp_times_total)? * &amp_precision;

    let mut token_balance = div_up_int(&(&inv2 + &c), &(invariant + &b))?;
    for iteration in 0..MAX_ITERATIONS {
        let previous = token_balance.clone();
        let denominator = &token_balance * 2u8 + &b - invariant;
        token_balance = div_up_int(&(&token_balance * &token_balance + &c), &denominator)?;
        trace!(iteration, %token_balance, "stable balance step");
        if within_one(&token_balance, &previous) {
            return Ok(token_balance);
        }
    }
    Err(Error::convergence("stable balance", MAX_ITERATIONS))
}

/// Output for an exact input on rate-adjusted 18-decimal balances.
pub fn calc_out_given_in(
    amp: &BigInt,
    balances: &[BigInt],
    token_in: usize,
    token_out: usize,
    amount_in: &BigInt,
    invariant: &BigInt,
) -> Result<BigInt> {
    let mut balances = balances.to_vec();
    balances[token_in] += amount_in;
    let final_balance_out = token_balance_given_invariant(amp, &balances, invariant, token_out)?;
    fixed_point::sub(&fixed_point::sub(&balances[token_out], &final_balance_out)?, &BigInt::one())
}

/// Input for an exact output on rate-adjusted 18-decimal balances.
pub fn calc_in_given_out(
    amp: &BigInt,
    balances: &[BigInt],
    token_in: usize,
    token_out: usize,
    amount_out: &BigInt,
    invariant: &BigInt,
) -> Result<BigInt> {
    let mut balances = balances.to_vec();
    balances[token_out] = fixed_point::sub(&balances[token_out], amount_out)?;
    let final_balance_in = token_balance_given_invariant(amp, &balances, invariant, token_in)?;
    Ok(fixed_point::sub(&final_balance_in, &balances[token_in])? + 1u8)
}

/// Combined decimal and rate scaling factor, `10^(18 - d) * rate`.
fn scaling_factor(token: &PoolToken) -> BigInt {
    mul_down(&(token.scaling_factor() * &*ONE), &token.price_rate)
}

fn upscale(token: &PoolToken, amount: &BigInt) -> BigInt {
    mul_down(amount, &scaling_factor(token))
}

fn downscale_down(token: &PoolToken, amount: &BigInt) -> Result<BigInt> {
    div_down(amount, &scaling_factor(token))
}

fn downscale_up(token: &PoolToken, amount: &BigInt) -> Result<BigInt> {
    div_up(amount, &scaling_factor(token))
}

impl StableMath {
    fn balances(&self, tokens: &[PoolToken]) -> Vec<BigInt> {
        tokens.iter().map(|t| upscale(t, &t.balance)).collect()
    }
}

impl SwapMath for StableMath {
    fn name(&self) -> &'static str {
        "stable"
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        let balances = self.balances(ctx.tokens);
        let invariant = calculate_invariant(&self.amp, &balances)?;
        let amount_in = subtract_fee_rounding_up(amount_in, ctx.swap_fee)?;
        let out = calc_out_given_in(
            &self.amp,
            &balances,
            ctx.token_in,
            ctx.token_out,
            &upscale(ctx.tin(), &amount_in),
            &invariant,
        )?;
        downscale_down(ctx.tout(), &out)
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        let balances = self.balances(ctx.tokens);
        let invariant = calculate_invariant(&self.amp, &balances)?;
        let amount_in = calc_in_given_out(
            &self.amp,
            &balances,
            ctx.token_in,
            ctx.token_out,
            &upscale(ctx.tout(), amount_out),
            &invariant,
        )?;
        add_fee(&downscale_up(ctx.tin(), &amount_in)?, ctx.swap_fee)
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        let (tin, tout) = (ctx.tin(), ctx.tout());
        let out_limit = mul_down(&upscale(tout, &tout.balance), &ALMOST_ONE);
        match kind {
            // Rate-adjusted balances are on a common scale, so the same
            // quantity of input buys roughly that quantity of output.
            SwapKind::GivenIn => downscale_down(tin, &out_limit),
            SwapKind::GivenOut => downscale_down(tout, &out_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_invariant_equals_sum() {
        let balances = vec![pow10(24), pow10(24)];
        let amp = BigInt::from(200u32 * AMP_PRECISION);
        let invariant = calculate_invariant(&amp, &balances).unwrap();
        assert!((&invariant - BigInt::from(2u8) * pow10(24)).abs() <= BigInt::from(2u8));
    }

    #[test]
    fn balance_solver_recovers_balance() {
        let balances = vec![pow10(24), BigInt::from(3u8) * pow10(23), BigInt::from(7u8) * pow10(23)];
        let amp = BigInt::from(100u32 * AMP_PRECISION);
        let invariant = calculate_invariant(&amp, &balances).unwrap();
        let solved = token_balance_given_invariant(&amp, &balances, &invariant, 1).unwrap();
        assert!((&solved - &balances[1]).abs() <= BigInt::from(10u8));
    }

    #[test]
    fn empty_token_balance_is_a_math_error() {
        let balances = vec![BigInt::zero(), pow10(24)];
        let amp = BigInt::from(200u32 * AMP_PRECISION);
        assert_eq!(
            calculate_invariant(&amp, &balances),
            Err(Error::Math(crate::error::MathError::ZeroDivision))
        );
    }
}
