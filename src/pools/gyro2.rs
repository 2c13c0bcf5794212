//! Two-asset concentrated constant-product pools (Gyro 2-CLP).
//!
//! Liquidity is concentrated on the price range `[alpha, beta]`. The curve
//! is `(x + L / sqrt(beta)) * (y + L * sqrt(alpha)) = L^2`.

use std::sync::LazyLock;

use num_bigint::BigInt;
use num_traits::Zero;
use tracing::trace;

use crate::error::{Result, Violation};
use crate::fixed_point::{complement, div_down, div_up, mul_down, mul_up, pow10, sub, ONE};
use crate::xp_math::sqrt;

use super::{add_fee, subtract_fee_rounding_down, SwapContext, SwapKind, SwapMath};

/// Share of the output balance a single swap may take.
pub static SWAP_LIMIT_FACTOR: LazyLock<BigInt> = LazyLock::new(|| BigInt::from(999_999u32) * pow10(12));

/// `sqrt(alpha)` and `sqrt(beta)` at 18 decimals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gyro2Math {
    /// Square root of the lower price bound.
    pub sqrt_alpha: BigInt,
    /// Square root of the upper price bound.
    pub sqrt_beta: BigInt,
}

/// Terms `(a, -b, b^2, -c)` of the quadratic `a L^2 + b L + c = 0`.
pub fn quadratic_terms(balances: [&BigInt; 2], sqrt_alpha: &BigInt, sqrt_beta: &BigInt) -> Result<[BigInt; 4]> {
    let [x, y] = balances;
    let a = sub(&ONE, &div_down(sqrt_alpha, sqrt_beta)?)?;
    let mb = div_down(y, sqrt_beta)? + mul_down(x, sqrt_alpha);
    let mc = mul_down(x, y);
    // b^2 = x^2 alpha + 2xy sqrt(alpha/beta) + y^2 / beta, expanded for precision.
    let b_square = mul_down(&mul_down(&mul_down(x, x), sqrt_alpha), sqrt_alpha)
        + div_down(&(mul_down(&mul_down(x, y), sqrt_alpha) * 2u8), sqrt_beta)?
        + div_down(&mul_down(y, y), &mul_up(sqrt_beta, sqrt_beta))?;
    Ok([a, mb, b_square, mc])
}

/// Positive root of the quadratic, rounded down.
pub fn solve_quadratic(a: &BigInt, mb: &BigInt, b_square: &BigInt, mc: &BigInt) -> Result<BigInt> {
    let denominator = mul_up(a, &(&*ONE * 2u8));
    let add_term = mul_down(&mul_down(mc, &(&*ONE * 4u8)), a);
    let radicand = b_square + add_term;
    let numerator = mb + sqrt(&radicand, 5)?;
    div_down(&numerator, &denominator)
}

/// The invariant `L` for `[x, y]`.
pub fn calculate_invariant(balances: [&BigInt; 2], sqrt_alpha: &BigInt, sqrt_beta: &BigInt) -> Result<BigInt> {
    let [a, mb, b_square, mc] = quadratic_terms(balances, sqrt_alpha, sqrt_beta)?;
    solve_quadratic(&a, &mb, &b_square, &mc)
}

/// Virtual offsets `(L / sqrt(beta), L * sqrt(alpha))`.
pub fn virtual_params(invariant: &BigInt, sqrt_alpha: &BigInt, sqrt_beta: &BigInt) -> Result<(BigInt, BigInt)> {
    Ok((div_down(invariant, sqrt_beta)?, mul_down(invariant, sqrt_alpha)))
}

fn virtual_balances(
    balance_in: &BigInt,
    balance_out: &BigInt,
    virtual_in: &BigInt,
    virtual_out: &BigInt,
) -> (BigInt, BigInt) {
    let in_over = balance_in + mul_up(virtual_in, &(&*ONE + 2u8));
    let out_under = balance_out + mul_down(virtual_out, &(&*ONE - 1u8));
    (in_over, out_under)
}

/// Output for `amount_in`, with virtual offsets pushed against the trader.
pub fn calc_out_given_in(
    balance_in: &BigInt,
    balance_out: &BigInt,
    amount_in: &BigInt,
    virtual_in: &BigInt,
    virtual_out: &BigInt,
) -> Result<BigInt> {
    let (in_over, out_under) = virtual_balances(balance_in, balance_out, virtual_in, virtual_out);
    let amount_out = div_down(&mul_down(&out_under, amount_in), &(in_over + amount_in))?;
    if &amount_out > balance_out {
        return Err(Violation::AssetBoundsExceeded.into());
    }
    Ok(amount_out)
}

/// Input for `amount_out`, with virtual offsets pushed against the trader.
pub fn calc_in_given_out(
    balance_in: &BigInt,
    balance_out: &BigInt,
    amount_out: &BigInt,
    virtual_in: &BigInt,
    virtual_out: &BigInt,
) -> Result<BigInt> {
    if amount_out > balance_out {
        return Err(Violation::AssetBoundsExceeded.into());
    }
    let (in_over, out_under) = virtual_balances(balance_in, balance_out, virtual_in, virtual_out);
    div_up(&mul_up(&in_over, amount_out), &sub(&out_under, amount_out)?)
}

impl Gyro2Math {
    /// Price bounds as seen from the input token: inverted when the input is
    /// the second pool token.
    fn oriented(&self, token_in: usize) -> Result<(BigInt, BigInt)> {
        if token_in == 0 {
            Ok((self.sqrt_alpha.clone(), self.sqrt_beta.clone()))
        } else {
            Ok((div_down(&ONE, &self.sqrt_beta)?, div_down(&ONE, &self.sqrt_alpha)?))
        }
    }

    fn state(&self, ctx: &SwapContext<'_>) -> Result<State> {
        let (sqrt_alpha, sqrt_beta) = self.oriented(ctx.token_in)?;
        let balance_in = ctx.tin().balance_scaled18();
        let balance_out = ctx.tout().balance_scaled18();
        let invariant = calculate_invariant([&balance_in, &balance_out], &sqrt_alpha, &sqrt_beta)?;
        let (virtual_in, virtual_out) = virtual_params(&invariant, &sqrt_alpha, &sqrt_beta)?;
        trace!(%invariant, "gyro2 invariant");
        Ok(State {
            sqrt_alpha,
            sqrt_beta,
            balance_in,
            balance_out,
            invariant,
            virtual_in,
            virtual_out,
        })
    }
}

struct State {
    sqrt_alpha: BigInt,
    sqrt_beta: BigInt,
    balance_in: BigInt,
    balance_out: BigInt,
    invariant: BigInt,
    virtual_in: BigInt,
    virtual_out: BigInt,
}

impl SwapMath for Gyro2Math {
    fn name(&self) -> &'static str {
        "gyro2"
    }

    fn out_given_in(&self, ctx: &SwapContext<'_>, amount_in: &BigInt) -> Result<BigInt> {
        let s = self.state(ctx)?;
        let amount_in = subtract_fee_rounding_down(amount_in, ctx.swap_fee)?;
        let out = calc_out_given_in(
            &s.balance_in,
            &s.balance_out,
            &ctx.tin().upscale(&amount_in),
            &s.virtual_in,
            &s.virtual_out,
        )?;
        Ok(ctx.tout().downscale_down(&out))
    }

    fn in_given_out(&self, ctx: &SwapContext<'_>, amount_out: &BigInt) -> Result<BigInt> {
        let s = self.state(ctx)?;
        let amount_in = calc_in_given_out(
            &s.balance_in,
            &s.balance_out,
            &ctx.tout().upscale(amount_out),
            &s.virtual_in,
            &s.virtual_out,
        )?;
        add_fee(&ctx.tin().downscale_up(&amount_in)?, ctx.swap_fee)
    }

    fn swap_limit(&self, ctx: &SwapContext<'_>, kind: SwapKind) -> Result<BigInt> {
        match kind {
            SwapKind::GivenIn => {
                let s = self.state(ctx)?;
                // Largest input balance on the curve: L * (1/sqrt(alpha) - 1/sqrt(beta)).
                let span = sub(&div_down(&ONE, &s.sqrt_alpha)?, &div_down(&ONE, &s.sqrt_beta)?)?;
                let max_balance_in = mul_down(&s.invariant, &span);
                let headroom = if max_balance_in > s.balance_in {
                    max_balance_in - &s.balance_in
                } else {
                    BigInt::zero()
                };
                let limit = div_down(&headroom, &complement(ctx.swap_fee))?;
                Ok(ctx.tin().downscale_down(&limit))
            }
            SwapKind::GivenOut => {
                let tout = ctx.tout();
                Ok(tout.downscale_down(&mul_down(&tout.balance_scaled18(), &SWAP_LIMIT_FACTOR)))
            }
        }
    }
}
